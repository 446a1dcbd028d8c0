use {
    super::callback::CallbackPayload,
    super::error::{CorrelationError, EncryptionError, TransportError},
    std::{future::Future, pin::Pin},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Basic { username: String, password: String },
    Bearer(String),
}

/// One outbound HTTP exchange, independent of the client library.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub auth: Authorization,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Send a request and return status + body. Implementations enforce their own
/// timeout and must not retry.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + Send + '_>>;
}

/// Produces the B2C `SecurityCredential` from the initiator password.
pub trait SecretEncryptor: Send + Sync {
    fn encrypt(&self, secret: &str) -> Result<String, EncryptionError>;
}

/// Observability sink for callbacks that could not be applied normally.
/// Called outside the registry lock; implementations must not block.
pub trait CallbackSink: Send + Sync {
    fn record(&self, anomaly: &CorrelationError, payload: Option<&CallbackPayload>);
}
