//! Webhook rejection errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Why an inbound webhook delivery was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// A required header is absent or not valid ASCII
    #[error("Missing or unreadable header: {0}")]
    MissingHeader(&'static str),

    /// Signature header malformed or does not match
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Timestamp header could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Message is older than the replay window
    #[error("Message is {age_secs}s old, beyond the {window_secs}s replay window")]
    StaleMessage {
        /// Age of the message in seconds
        age_secs: i64,
        /// Configured window in seconds
        window_secs: u64,
    },

    /// Body is not valid JSON
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Challenge verification body has no challenge
    #[error("Challenge verification payload has no challenge")]
    MissingChallenge,
}

impl WebhookError {
    /// HTTP status returned to the platform.
    ///
    /// Authentication and replay failures share one status so the rejection
    /// policy stays uniform.
    pub fn status_code(&self) -> StatusCode {
        if self.is_auth_failure() {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    /// Whether this is an authentication or replay rejection
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingHeader(_)
                | Self::InvalidSignature(_)
                | Self::InvalidTimestamp(_)
                | Self::StaleMessage { .. }
        )
    }

    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) => "missing_header",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::StaleMessage { .. } => "stale_message",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::MissingChallenge => "missing_challenge",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        // Auth failures get no detail beyond the code.
        let body = if self.is_auth_failure() {
            json!({ "error": "forbidden" })
        } else {
            json!({ "error": self.code(), "message": self.to_string() })
        };
        (self.status_code(), Json(body)).into_response()
    }
}
