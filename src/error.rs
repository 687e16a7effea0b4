//! Error types for EventSub Relay
//!
//! This module provides the crate-wide error hierarchy using `thiserror`.
//! Each transport keeps its own error enum next to the code that raises it;
//! the fallible setup paths (`RelayConfig::from_env`,
//! `SocketListener::from_relay_config`) fold theirs into [`Error`].

use thiserror::Error;

use crate::socket::ApiError;

/// The main error type for EventSub Relay setup
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Subscription API client errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Configuration loading and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is not set
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),

    /// Webhook shared secret is empty
    #[error("Webhook secret cannot be empty")]
    EmptySecret,

    /// Value could not be parsed
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue {
        /// Variable or field name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Socket URL is malformed or carries a query string
    #[error("Invalid socket URL: {0}")]
    InvalidSocketUrl(String),
}

/// Result type alias for EventSub Relay operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config(ConfigError::MissingVar("EVENTSUB_WEBHOOK_SECRET"));
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("EVENTSUB_WEBHOOK_SECRET"));
    }

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            name: "EVENTSUB_DEDUP_CAPACITY",
            reason: "must be greater than zero".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for EVENTSUB_DEDUP_CAPACITY: must be greater than zero"
        );
    }

    #[test]
    fn test_api_error_conversion() {
        let err: Error = ApiError::MissingToken.into();
        assert!(matches!(err, Error::Api(ApiError::MissingToken)));
        assert!(err.to_string().starts_with("API error:"));
    }

    #[test]
    fn test_config_error_propagates_with_question_mark() {
        fn load() -> Result<crate::config::WebhookConfig> {
            Ok(crate::config::WebhookConfig::new("")?)
        }

        assert!(matches!(load(), Err(Error::Config(ConfigError::EmptySecret))));
    }
}
