//! Socket transport and subscription API errors

use std::time::Duration;

use thiserror::Error;

/// Why a socket connection attempt ended
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// The websocket handshake failed
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// No session welcome arrived in time
    #[error("No session welcome within {0:?}")]
    WelcomeTimeout(Duration),

    /// First frame was something other than a session welcome
    #[error("Expected session welcome, got '{0}'")]
    UnexpectedFrame(String),

    /// A frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Read error on an established connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// The platform closed the connection
    #[error("Connection closed")]
    Closed,

    /// The platform asked the client to move to a new connection
    #[error("Reconnect requested")]
    ReconnectRequested {
        /// Where the platform suggested reconnecting; unused, a fresh
        /// handshake on the configured endpoint is always made instead
        reconnect_url: Option<String>,
    },
}

impl SocketError {
    /// Metric label
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect_failed",
            Self::WelcomeTimeout(_) => "welcome_timeout",
            Self::UnexpectedFrame(_) => "unexpected_frame",
            Self::MalformedFrame(_) => "malformed_frame",
            Self::Transport(_) => "transport_error",
            Self::Closed => "closed",
            Self::ReconnectRequested { .. } => "reconnect_requested",
        }
    }
}

/// Subscription REST API errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Request could not be sent or the response not read
    #[error("Request failed: {0}")]
    Request(String),

    /// Non-success status from the API
    #[error("API returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// Neither a per-broadcaster nor an application token is available
    #[error("No authorization token available")]
    MissingToken,
}
