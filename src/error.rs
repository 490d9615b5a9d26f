//! # Error Handling
//!
//! Two error families live here:
//!
//! - **`AppError`**: errors returned by HTTP handlers, converted into JSON
//!   responses through actix's `ResponseError` trait.
//! - **`BridgeError`**: errors that end a single bridged call. They never
//!   cross session boundaries; the orchestrator logs them and tears the
//!   session down.
//!
//! ## Fatal vs tolerated:
//! Only conditions that end a session are represented by `BridgeError`.
//! Malformed agent events are tolerated by the relay and never become errors.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// HTTP-facing error types.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **NotFound**: Requested resource doesn't exist (404 errors)
/// - **ConfigError**: Configuration problems (500 errors)
/// - **Unavailable**: Capacity exhausted, try again later (503 errors)
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
    ConfigError(String),
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// Converts errors into HTTP responses with a consistent JSON body:
///
/// ```json
/// {
///   "error": {
///     "type": "bad_request",
///     "message": "Missing 'destination_number' in request body",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::Unavailable(msg) => (
                actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                msg.clone(),
            ),
        };

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

/// JSON parsing errors are almost always the client's fault, so they map to 400.
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

/// Errors that end one bridged call.
///
/// ## Variants:
/// - **MalformedTelephonyFrame**: the telephony side broke its framing contract
///   (invalid JSON, missing fields, bad base64). Fail-fast.
/// - **TelephonyClosed**: a write was attempted after the caller's socket closed.
/// - **AgentConnection**: connecting to, reading from or writing to the agent failed.
/// - **AgentConfig**: the session could not be set up (missing credentials,
///   unusable settings template). Raised before any socket is used.
/// - **IdleTimeout**: a socket stayed silent longer than the configured timeout.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    MalformedTelephonyFrame(String),
    TelephonyClosed,
    AgentConnection(String),
    AgentConfig(String),
    IdleTimeout(&'static str),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::MalformedTelephonyFrame(msg) => {
                write!(f, "Malformed telephony frame: {}", msg)
            }
            BridgeError::TelephonyClosed => write!(f, "Telephony connection is closed"),
            BridgeError::AgentConnection(msg) => write!(f, "Agent connection error: {}", msg),
            BridgeError::AgentConfig(msg) => write!(f, "Agent configuration error: {}", msg),
            BridgeError::IdleTimeout(side) => write!(f, "No data received from {} in time", side),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::AgentConnection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_status_codes() {
        let resp = AppError::BadRequest("nope".to_string()).error_response();
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let resp = AppError::NotFound("user".to_string()).error_response();
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);

        let resp = AppError::Unavailable("full".to_string()).error_response();
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::MalformedTelephonyFrame("missing field `start`".to_string());
        assert_eq!(err.to_string(), "Malformed telephony frame: missing field `start`");
        assert_eq!(
            BridgeError::IdleTimeout("telephony").to_string(),
            "No data received from telephony in time"
        );
    }
}
