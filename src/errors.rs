//! Viewgate error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors that can occur while gating, metering, or serving.
///
/// Policy denials are never errors: a blocked IP or a reached view limit is
/// reported as state (see [`crate::policy::access::AccessDecision`] and
/// [`crate::gate::ClientGateState`]).
#[derive(Debug, Error)]
pub enum ViewgateError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Tracking store could not be read or written.
    #[error("Store I/O error: {0}")]
    StoreIO(String),

    /// HTTP transport error talking to the gate endpoints.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response or persisted snapshot could not be parsed.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Device signal collection failed, no fingerprint available.
    #[error("Fingerprint unavailable: {0}")]
    FingerprintUnavailable(String),

    /// Caller supplied an unusable argument.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Server could not bind or run.
    #[error("Server error: {0}")]
    Server(String),
}

impl ViewgateError {
    fn status_code(&self) -> StatusCode {
        match self {
            ViewgateError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ViewgateError::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ViewgateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_bad_request() {
        let response = ViewgateError::InvalidRequest("empty article id".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_failure_maps_to_internal_error() {
        let response = ViewgateError::StoreIO("disk full".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
