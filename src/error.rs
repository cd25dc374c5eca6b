//! Error handling for the traffic console

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing model/source, bad settings (rejected before any network call)
    #[error("Validation error: {0}")]
    Validation(String),

    /// No free slot (rejected before any network call)
    #[error("Over capacity: {0}")]
    OverCapacity(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local file transfer to the inference backend failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Backend rejected or was unreachable during start
    #[error("Start failed for slot {sid}: {message}")]
    Start { sid: u8, message: String },

    /// At least one submission of an aggregate save failed
    #[error("Save failed: {0}")]
    AggregateSave(String),

    /// Backend answered with an unexpected or rejecting payload
    #[error("API error: {0}")]
    Api(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Message without the variant prefix, for relaying backend text verbatim
    pub fn message(&self) -> String {
        match self {
            Error::Validation(msg)
            | Error::OverCapacity(msg)
            | Error::NotFound(msg)
            | Error::Upload(msg)
            | Error::AggregateSave(msg)
            | Error::Api(msg)
            | Error::Config(msg)
            | Error::Internal(msg) => msg.clone(),
            Error::Start { message, .. } => message.clone(),
            Error::Serialization(e) => e.to_string(),
            Error::Http(e) => e.to_string(),
            Error::Io(e) => e.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::OverCapacity(_) => (StatusCode::SERVICE_UNAVAILABLE, "OVER_CAPACITY"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Upload(_) => (StatusCode::BAD_GATEWAY, "UPLOAD_ERROR"),
            Error::Start { .. } => (StatusCode::BAD_GATEWAY, "START_ERROR"),
            Error::AggregateSave(_) => (StatusCode::BAD_GATEWAY, "SAVE_ERROR"),
            Error::Api(_) => (StatusCode::BAD_GATEWAY, "API_ERROR"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
