//! # Error Handling
//!
//! Two error families live here:
//!
//! - **`BridgeError`**: failures inside a voice session (wire decoding,
//!   session assembly, capability calls, transport loss). These never travel
//!   back over the audio channel; they end up in the operator logs.
//! - **`AppError`**: failures of the HTTP surface (launch, config, health),
//!   converted into JSON error responses through actix's `ResponseError`.
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "config_error",
//!     "message": "ATTENDEE_API_KEY not set in environment",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Errors raised while assembling or running one voice session.
///
/// ## Recovery policy per variant:
/// - **ProtocolDecode**: message dropped, session continues
/// - **Configuration**: session is never created
/// - **Capability**: logged, session is cancelled (no automatic retry)
/// - **Transport**: handled exactly like a peer disconnect
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed or unrecognized wire message
    #[error("protocol decode error: {0}")]
    ProtocolDecode(String),

    /// Missing credential or invalid configuration at assembly time
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A speech, generation or detection adapter failed
    #[error("{service} capability error: {message}")]
    Capability {
        service: &'static str,
        message: String,
    },

    /// The wire connection dropped or refused a write
    #[error("transport error: {0}")]
    Transport(String),
}

impl BridgeError {
    /// Shorthand for building a capability error tagged with its service.
    pub fn capability(service: &'static str, message: impl Into<String>) -> Self {
        BridgeError::Capability {
            service,
            message: message.into(),
        }
    }
}

/// Errors returned by HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: server-side problems (500)
/// - **BadRequest**: the client sent invalid data (400)
/// - **ConfigError**: missing credentials or configuration (500)
/// - **ValidationError**: input failed validation rules (400)
/// - **Upstream**: the meeting-bot provider rejected a request (502)
/// - **Unavailable**: the session limit is reached (503)
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl AppError {
    fn kind(&self) -> (actix_web::http::StatusCode, &'static str, &str) {
        use actix_web::http::StatusCode;

        match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        self.kind().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = self.kind();

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Session assembly failures surface to the launch side before any
/// websocket handshake, so they map onto HTTP errors.
impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Configuration(msg) => AppError::ConfigError(msg),
            BridgeError::ProtocolDecode(msg) => AppError::BadRequest(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

/// Shorthand for `Result<T, BridgeError>`.
pub type BridgeResult<T> = Result<T, BridgeError>;
