use {
    super::{id::CorrelationId, transaction::TransactionKind},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network: {0}")]
    Network(String),

    #[error("invalid request: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Network(#[from] TransportError),

    #[error("token request rejected (HTTP {status}): {code} {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("malformed token response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum InitiationError {
    #[error("auth: {0}")]
    Auth(#[from] AuthError),

    #[error("network: {0}")]
    Network(#[from] TransportError),

    #[error("rejected (HTTP {status}): {code} {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("security credential: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("{0} is not configured")]
    NotConfigured(TransactionKind),
}

/// Correlation anomalies. Only `AlreadyRegistered`, `Closed` and `Timeout`
/// are returned to callers; `Orphan` and `DuplicateResolve` are reported to
/// the callback sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("orphaned callback for {0}")]
    Orphan(CorrelationId),

    #[error("duplicate callback for {0}")]
    DuplicateResolve(CorrelationId),

    #[error("timed out waiting for {0}")]
    Timeout(CorrelationId),

    #[error("{0} is already awaiting a callback")]
    AlreadyRegistered(CorrelationId),

    #[error("correlator is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("certificate: {0}")]
    Certificate(String),

    #[error("public key: {0}")]
    Key(String),

    #[error("encrypt: {0}")]
    Encrypt(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("malformed callback: {0}")]
    Malformed(String),

    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
