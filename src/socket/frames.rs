//! Socket frame decoding
//!
//! Every frame is `{"metadata": {...}, "payload": {...}}`; the
//! `metadata.message_type` decides how the payload is read.

use serde::Deserialize;
use serde_json::Value;

use crate::dispatch::{Envelope, Metadata};
use crate::socket::error::SocketError;

/// `message_type` of the first frame on a connection
pub const SESSION_WELCOME: &str = "session_welcome";
/// `message_type` of idle heartbeats
pub const SESSION_KEEPALIVE: &str = "session_keepalive";
/// `message_type` of a migration request
pub const SESSION_RECONNECT: &str = "session_reconnect";
/// `message_type` of event notifications
pub const NOTIFICATION: &str = "notification";
/// `message_type` of subscription revocations
pub const REVOCATION: &str = "revocation";

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    payload: Value,
}

/// A decoded socket frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Handshake complete; subscriptions may be created for `session_id`
    Welcome {
        /// Session to attach subscriptions to
        session_id: String,
    },
    /// Heartbeat, nothing to do
    Keepalive,
    /// Event notification
    Notification(Envelope),
    /// The platform wants the client on a new connection
    Reconnect {
        /// Suggested endpoint
        reconnect_url: Option<String>,
    },
    /// A subscription was revoked
    Revocation {
        /// Revoked subscription type
        subscription_type: Option<String>,
        /// Revocation status reported by the platform
        reason: Option<String>,
    },
    /// Unrecognized message type
    Other(String),
}

impl Frame {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// [`SocketError::MalformedFrame`] for invalid JSON, or for a welcome
    /// without a session id.
    pub fn parse(text: &str) -> Result<Self, SocketError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| SocketError::MalformedFrame(e.to_string()))?;
        let raw: RawFrame = serde_json::from_value(value.clone())
            .map_err(|e| SocketError::MalformedFrame(e.to_string()))?;

        let message_type = raw.metadata.message_type.clone().unwrap_or_default();
        let session = raw.payload.get("session");

        let frame = match message_type.as_str() {
            SESSION_WELCOME => {
                let session_id = session
                    .and_then(|s| s.get("id"))
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        SocketError::MalformedFrame("session welcome without session id".to_string())
                    })?;
                Frame::Welcome {
                    session_id: session_id.to_string(),
                }
            }
            SESSION_KEEPALIVE => Frame::Keepalive,
            SESSION_RECONNECT => Frame::Reconnect {
                reconnect_url: session
                    .and_then(|s| s.get("reconnect_url"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            NOTIFICATION => Frame::Notification(Envelope::from_value(&value)),
            REVOCATION => {
                let subscription = raw.payload.get("subscription");
                Frame::Revocation {
                    subscription_type: subscription
                        .and_then(|s| s.get("type"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or(raw.metadata.subscription_type),
                    reason: subscription
                        .and_then(|s| s.get("status"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }
            }
            other => Frame::Other(other.to_string()),
        };

        Ok(frame)
    }

    /// Short name for logs
    pub fn kind(&self) -> &str {
        match self {
            Self::Welcome { .. } => SESSION_WELCOME,
            Self::Keepalive => SESSION_KEEPALIVE,
            Self::Notification(_) => NOTIFICATION,
            Self::Reconnect { .. } => SESSION_RECONNECT,
            Self::Revocation { .. } => REVOCATION,
            Self::Other(kind) => kind,
        }
    }
}
