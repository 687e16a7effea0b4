//! Replay-window enforcement

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::webhook::error::WebhookError;

/// Rejects messages whose declared timestamp is older than a fixed window.
///
/// Unparsable timestamps are rejected too; they are treated as suspicious
/// rather than as format errors.
#[derive(Debug, Clone, Copy)]
pub struct ReplayGuard {
    window: Duration,
}

impl ReplayGuard {
    /// Create a guard with the given freshness window
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// The configured window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check `timestamp` against the current time.
    pub fn check(&self, timestamp: &str) -> Result<DateTime<Utc>, WebhookError> {
        self.check_at(timestamp, Utc::now())
    }

    /// Check `timestamp` against `now`.
    pub fn check_at(&self, timestamp: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, WebhookError> {
        let declared = parse_timestamp(timestamp)?;
        let age = now.signed_duration_since(declared);

        if age.num_milliseconds() > self.window.as_millis() as i64 {
            return Err(WebhookError::StaleMessage {
                age_secs: age.num_seconds(),
                window_secs: self.window.as_secs(),
            });
        }

        Ok(declared)
    }
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, WebhookError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| WebhookError::InvalidTimestamp(format!("invalid RFC3339 timestamp: {err}")))
}
