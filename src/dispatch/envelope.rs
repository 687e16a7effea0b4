//! Notification envelope normalization
//!
//! The platform delivers the same logical notification in two shapes. The
//! webhook carries `subscription`/`event` at the top level, the socket nests
//! them under `payload`. [`Envelope::from_value`] folds both into one form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event fields checked for the broadcaster id, highest priority first
pub const EVENT_ID_FIELDS: [&str; 3] = ["broadcaster_user_id", "to_broadcaster_user_id", "user_id"];

/// Condition fields checked for the broadcaster id after the event fields
pub const CONDITION_ID_FIELDS: [&str; 2] = ["broadcaster_user_id", "to_broadcaster_user_id"];

/// Event fields checked for the broadcaster login
pub const EVENT_LOGIN_FIELDS: [&str; 3] = [
    "broadcaster_user_login",
    "to_broadcaster_user_login",
    "user_login",
];

/// Condition fields checked for the broadcaster login
pub const CONDITION_LOGIN_FIELDS: [&str; 2] =
    ["broadcaster_user_login", "to_broadcaster_user_login"];

/// Message metadata (socket frames carry it in-band, webhooks in headers)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique message identifier
    #[serde(default)]
    pub message_id: Option<String>,

    /// Message type (`notification`, `session_welcome`, ...)
    #[serde(default)]
    pub message_type: Option<String>,

    /// Subscription type for notifications
    #[serde(default)]
    pub subscription_type: Option<String>,

    /// RFC 3339 timestamp
    #[serde(default, alias = "message_timestamp")]
    pub timestamp: Option<String>,
}

/// Normalized notification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    /// Message metadata
    pub metadata: Metadata,

    /// `subscription.type`, if present
    pub subscription_type: Option<String>,

    /// `subscription.condition`
    pub condition: Map<String, Value>,

    /// The `event` object
    pub event: Map<String, Value>,
}

/// Who an event is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcasterIdentity {
    /// Broadcaster user id
    pub id: String,
    /// Broadcaster login, when the payload carries one
    pub login: Option<String>,
}

/// Event handed to consumer callbacks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcasterEvent {
    /// Subscription type the event arrived under
    pub event_type: String,
    /// Broadcaster user id
    pub broadcaster_id: String,
    /// Broadcaster login, if known
    pub broadcaster_login: Option<String>,
    /// Originating message id, if known
    pub message_id: Option<String>,
    /// Raw event object
    pub event: Map<String, Value>,
}

impl Envelope {
    /// Normalize either wire shape into an envelope.
    ///
    /// The nested `payload` shape wins when it contains `event` or
    /// `subscription`; otherwise the top level is treated as the envelope.
    pub fn from_value(body: &Value) -> Self {
        let root = match body.get("payload") {
            Some(payload) if payload.get("event").is_some() || payload.get("subscription").is_some() => {
                payload
            }
            _ => body,
        };

        let metadata = body
            .get("metadata")
            .and_then(|m| serde_json::from_value::<Metadata>(m.clone()).ok())
            .unwrap_or_default();

        let subscription = root.get("subscription");

        let subscription_type = subscription
            .and_then(|s| s.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let condition = subscription
            .and_then(|s| s.get("condition"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let event = root
            .get("event")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            metadata,
            subscription_type,
            condition,
            event,
        }
    }

    /// Attach metadata received out of band (webhook headers).
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Subscription type, falling back to the metadata copy
    pub fn subscription_type(&self) -> Option<&str> {
        self.subscription_type
            .as_deref()
            .or(self.metadata.subscription_type.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Resolve the broadcaster this event is about.
    pub fn broadcaster(&self) -> Option<BroadcasterIdentity> {
        let id = extract_broadcaster_id(&self.event, &self.condition)?;
        let login = extract_broadcaster_login(&self.event, &self.condition);
        Some(BroadcasterIdentity { id, login })
    }

    /// Build the callback payload for `identity`.
    pub fn into_event(self, event_type: impl Into<String>, identity: BroadcasterIdentity) -> BroadcasterEvent {
        BroadcasterEvent {
            event_type: event_type.into(),
            broadcaster_id: identity.id,
            broadcaster_login: identity.login,
            message_id: self.metadata.message_id,
            event: self.event,
        }
    }
}

/// Broadcaster id by fixed priority: event fields, then condition fields.
pub fn extract_broadcaster_id(event: &Map<String, Value>, condition: &Map<String, Value>) -> Option<String> {
    first_non_empty(event, &EVENT_ID_FIELDS).or_else(|| first_non_empty(condition, &CONDITION_ID_FIELDS))
}

/// Broadcaster login by the same priority rule as the id.
pub fn extract_broadcaster_login(
    event: &Map<String, Value>,
    condition: &Map<String, Value>,
) -> Option<String> {
    first_non_empty(event, &EVENT_LOGIN_FIELDS)
        .or_else(|| first_non_empty(condition, &CONDITION_LOGIN_FIELDS))
}

fn first_non_empty(map: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| map.get(*field).and_then(scalar_text))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
