use crate::domain::error::{CallbackError, InitiationError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub enum ApiError {
    Callback(CallbackError),
    Initiation(InitiationError),
    /// Initiation form that failed to parse or validate.
    Invalid(String),
    NotFound(String),
}

impl From<CallbackError> for ApiError {
    fn from(err: CallbackError) -> Self {
        Self::Callback(err)
    }
}

impl From<InitiationError> for ApiError {
    fn from(err: InitiationError) -> Self {
        Self::Initiation(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Callback(CallbackError::Malformed(msg)) => {
                tracing::warn!("rejecting malformed callback: {msg}");
                (StatusCode::BAD_REQUEST, "malformed_callback", msg)
            }
            ApiError::Callback(CallbackError::Validation(msg)) => {
                tracing::warn!("rejecting invalid callback: {msg}");
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg)
            }
            ApiError::Invalid(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Initiation(err) => initiation_response(err),
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

fn initiation_response(err: InitiationError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        InitiationError::NotConfigured(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "not_configured", message)
        }
        InitiationError::Auth(_) => {
            tracing::warn!("initiation failed: {message}");
            (StatusCode::BAD_GATEWAY, "auth_failed", message)
        }
        InitiationError::Network(_) => {
            tracing::warn!("initiation failed: {message}");
            (StatusCode::BAD_GATEWAY, "upstream_unavailable", message)
        }
        InitiationError::Rejected { .. } => {
            tracing::warn!("initiation failed: {message}");
            (StatusCode::BAD_GATEWAY, "upstream_rejected", message)
        }
        InitiationError::Protocol(_) => {
            tracing::warn!("initiation failed: {message}");
            (StatusCode::BAD_GATEWAY, "upstream_protocol", message)
        }
        InitiationError::Serialization(_) | InitiationError::Encryption(_) => {
            tracing::error!("initiation failed: {message}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error".to_string(),
            )
        }
    }
}
