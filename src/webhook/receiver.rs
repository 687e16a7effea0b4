//! Inbound webhook processing
//!
//! [`WebhookReceiver::handle`] runs one delivery through the full pipeline:
//!
//! ```text
//! headers ──> signature ──> replay window ──> JSON body ──> message type
//!                                                               │
//!       challenge ──> 200 text/plain <──────────────────────────┤
//!       revocation / unknown ──> 204 <──────────────────────────┤
//!       notification ──> dedup ──> spawn dispatch ──> 204 <─────┘
//! ```
//!
//! The acknowledgment never waits on consumer handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WebhookConfig;
use crate::dispatch::{CallbackRegistry, EventHandler, Envelope, Metadata};
use crate::error::ConfigError;
use crate::handlers::RelayStats;
use crate::webhook::dedup::DedupCache;
use crate::webhook::error::WebhookError;
use crate::webhook::replay::ReplayGuard;
use crate::webhook::signature::SignatureVerifier;

/// Header carrying the unique message id
pub const HEADER_MESSAGE_ID: &str = "Twitch-Eventsub-Message-Id";
/// Header carrying the RFC 3339 send time
pub const HEADER_MESSAGE_TIMESTAMP: &str = "Twitch-Eventsub-Message-Timestamp";
/// Header carrying `sha256=<hex>`
pub const HEADER_MESSAGE_SIGNATURE: &str = "Twitch-Eventsub-Message-Signature";
/// Header carrying the message type
pub const HEADER_MESSAGE_TYPE: &str = "Twitch-Eventsub-Message-Type";
/// Header carrying the subscription type
pub const HEADER_SUBSCRIPTION_TYPE: &str = "Twitch-Eventsub-Subscription-Type";

/// Webhook message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    /// Subscription ownership challenge
    Verification,
    /// Event notification
    Notification,
    /// Subscription revoked by the platform
    Revocation,
    /// Anything else, including a missing header
    Other(String),
}

impl MessageType {
    /// Classify a header value
    pub fn parse(value: &str) -> Self {
        match value {
            "webhook_callback_verification" => Self::Verification,
            "notification" => Self::Notification,
            "revocation" => Self::Revocation,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Successful outcome of a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    /// Echo the challenge back as plain text
    Challenge(String),
    /// Empty acknowledgment
    Accepted,
}

impl IntoResponse for WebhookAck {
    fn into_response(self) -> Response {
        match self {
            Self::Challenge(challenge) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                challenge,
            )
                .into_response(),
            Self::Accepted => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// Authenticates, deduplicates and dispatches webhook deliveries.
///
/// Dedup state and handlers are owned per instance; two receivers never
/// share either.
pub struct WebhookReceiver {
    verifier: SignatureVerifier,
    replay: ReplayGuard,
    dedup: DedupCache,
    registry: Arc<CallbackRegistry>,
    stats: Arc<RelayStats>,
}

impl WebhookReceiver {
    /// Create a receiver with its own registry and stats.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySecret`] if the configured secret is empty.
    pub fn new(config: &WebhookConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            verifier: SignatureVerifier::new(config.secret())?,
            replay: ReplayGuard::new(config.replay_window),
            dedup: DedupCache::new(config.dedup_capacity),
            registry: Arc::new(CallbackRegistry::new()),
            stats: Arc::new(RelayStats::new()),
        })
    }

    /// Shorthand for a receiver with default limits
    pub fn with_secret(secret: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(&WebhookConfig::new(secret)?)
    }

    /// Use an externally shared stats block
    pub fn with_stats(mut self, stats: Arc<RelayStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Install `handler` for `event_type`, replacing any previous one
    pub fn register<H: EventHandler>(&self, event_type: impl Into<String>, handler: H) {
        self.registry.register(event_type, handler);
    }

    /// The handler registry
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// The dedup cache
    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Stats updated by this receiver
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Process one delivery.
    ///
    /// Must be called from within a Tokio runtime; notifications are
    /// dispatched on a spawned task.
    pub fn handle(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookAck, WebhookError> {
        let started = Instant::now();
        let result = self.process(headers, body);

        self.stats.record_webhook(started.elapsed());
        let outcome = match &result {
            Ok(WebhookAck::Challenge(_)) => "challenge",
            Ok(WebhookAck::Accepted) => "accepted",
            Err(err) => {
                self.stats.record_rejection();
                err.code()
            }
        };
        counter!("eventsub_webhook_total", "outcome" => outcome).increment(1);

        result
    }

    fn process(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookAck, WebhookError> {
        let message_id = required_header(headers, HEADER_MESSAGE_ID)?;
        let timestamp = required_header(headers, HEADER_MESSAGE_TIMESTAMP)?;
        let signature = required_header(headers, HEADER_MESSAGE_SIGNATURE)?;

        if let Err(err) = self.verifier.verify(message_id, timestamp, body, signature) {
            warn!(message_id = %message_id, error = %err, "Rejecting webhook with bad signature");
            return Err(err);
        }

        if let Err(err) = self.replay.check(timestamp) {
            warn!(message_id = %message_id, error = %err, "Rejecting webhook outside replay window");
            return Err(err);
        }

        let payload: Value = serde_json::from_slice(body).map_err(|e| {
            debug!(message_id = %message_id, error = %e, "Webhook body is not JSON");
            WebhookError::InvalidPayload(e.to_string())
        })?;

        let message_type = MessageType::parse(optional_header(headers, HEADER_MESSAGE_TYPE).unwrap_or(""));
        let subscription_type = optional_header(headers, HEADER_SUBSCRIPTION_TYPE);

        match message_type {
            MessageType::Verification => {
                let challenge = payload
                    .get("challenge")
                    .and_then(Value::as_str)
                    .filter(|c| !c.is_empty())
                    .ok_or(WebhookError::MissingChallenge)?;
                info!(
                    message_id = %message_id,
                    subscription_type = ?subscription_type,
                    "Answering webhook challenge"
                );
                Ok(WebhookAck::Challenge(challenge.to_string()))
            }
            MessageType::Revocation => {
                let subscription = payload.get("subscription");
                let revoked_type = subscription
                    .and_then(|s| s.get("type"))
                    .and_then(Value::as_str)
                    .or(subscription_type);
                let reason = subscription
                    .and_then(|s| s.get("status"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                warn!(
                    message_id = %message_id,
                    subscription_type = ?revoked_type,
                    reason = %reason,
                    "Subscription revoked"
                );
                Ok(WebhookAck::Accepted)
            }
            MessageType::Other(kind) => {
                debug!(message_id = %message_id, message_type = %kind, "Ignoring unknown message type");
                Ok(WebhookAck::Accepted)
            }
            MessageType::Notification => {
                if !self.dedup.check_and_record(message_id) {
                    debug!(message_id = %message_id, "Duplicate webhook message; acknowledging");
                    self.stats.record_duplicate();
                    return Ok(WebhookAck::Accepted);
                }

                let envelope = Envelope::from_value(&payload).with_metadata(Metadata {
                    message_id: Some(message_id.to_string()),
                    message_type: Some("notification".to_string()),
                    subscription_type: subscription_type.map(str::to_string),
                    timestamp: Some(timestamp.to_string()),
                });

                let registry = self.registry.clone();
                tokio::spawn(async move {
                    registry.dispatch(envelope).await;
                });
                self.stats.record_webhook_dispatch();

                Ok(WebhookAck::Accepted)
            }
        }
    }
}

fn required_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, WebhookError> {
    optional_header(headers, name).ok_or(WebhookError::MissingHeader(name))
}

fn optional_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
