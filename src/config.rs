//! Relay configuration
//!
//! All settings are read from environment variables. The webhook secret is
//! the only required value; everything else has a default that matches the
//! platform's published limits.
//!
//! - `EVENTSUB_WEBHOOK_SECRET` (required): HMAC shared secret
//! - `EVENTSUB_WEBHOOK_PATH`: webhook route (default `/eventsub`)
//! - `EVENTSUB_DEDUP_CAPACITY`: recently-seen message ids kept (default 2000)
//! - `EVENTSUB_REPLAY_WINDOW_SECS`: freshness window (default 600)
//! - `EVENTSUB_SOCKET_URL`: subscription socket endpoint
//! - `EVENTSUB_API_URL`: subscription REST base URL
//! - `EVENTSUB_CLIENT_ID` / `EVENTSUB_APP_TOKEN`: platform credentials
//! - `EVENTSUB_BROADCASTER_IDS`: comma-separated ids to watch over the socket
//! - `EVENTSUB_BROADCASTER_TOKENS`: `id=token` pairs, comma-separated
//! - `EVENTSUB_EVENT_TYPE`: socket event type (default `stream.offline`)
//! - `EVENTSUB_SUBSCRIBE_TIMEOUT_SECS`: deadline per subscription request (default 10)

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::error::ConfigError;

/// Default subscription socket endpoint
pub const DEFAULT_SOCKET_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

/// Default subscription REST base URL
pub const DEFAULT_API_URL: &str = "https://api.twitch.tv/helix";

/// Default webhook route
pub const DEFAULT_WEBHOOK_PATH: &str = "/eventsub";

/// Event type the socket listener subscribes to by default
pub const DEFAULT_EVENT_TYPE: &str = "stream.offline";

/// Number of recently seen message ids retained for deduplication
pub const DEFAULT_DEDUP_CAPACITY: usize = 2000;

/// Maximum accepted age of a webhook message
pub const DEFAULT_REPLAY_WINDOW: Duration = Duration::from_secs(600);

/// How long to wait for the session welcome frame
pub const DEFAULT_WELCOME_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for one subscription request
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed delay between failed connection attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Transport cap on subscriptions per socket connection
pub const MAX_SUBSCRIPTIONS_PER_CONNECTION: usize = 30;

// =============================================================================
// Webhook
// =============================================================================

/// Settings for the inbound webhook receiver
#[derive(Clone)]
pub struct WebhookConfig {
    secret: String,
    /// Route the webhook is mounted on
    pub path: String,
    /// Capacity of the dedup cache
    pub dedup_capacity: usize,
    /// Maximum accepted message age
    pub replay_window: Duration,
}

impl WebhookConfig {
    /// Create a webhook configuration with default limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySecret`] if `secret` is empty.
    pub fn new(secret: impl Into<String>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }

        Ok(Self {
            secret,
            path: DEFAULT_WEBHOOK_PATH.to_string(),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            replay_window: DEFAULT_REPLAY_WINDOW,
        })
    }

    /// The HMAC shared secret
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Override the dedup capacity
    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    /// Override the replay window
    pub fn with_replay_window(mut self, window: Duration) -> Self {
        self.replay_window = window;
        self
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &"<redacted>")
            .field("path", &self.path)
            .field("dedup_capacity", &self.dedup_capacity)
            .field("replay_window", &self.replay_window)
            .finish()
    }
}

// =============================================================================
// Socket listener
// =============================================================================

/// Settings for the subscription socket listener
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Socket endpoint (never carries query parameters)
    pub socket_url: Url,
    /// Event type subscribed to and dispatched
    pub event_type: String,
    /// Deadline for the session welcome frame
    pub welcome_timeout: Duration,
    /// Deadline for each subscription request
    pub subscribe_timeout: Duration,
    /// Delay before retrying after a failed attempt
    pub retry_delay: Duration,
    /// Subscriptions issued per connection at most
    pub max_subscriptions: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            socket_url: Url::parse(DEFAULT_SOCKET_URL).expect("default socket URL is valid"),
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            welcome_timeout: DEFAULT_WELCOME_TIMEOUT,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_subscriptions: MAX_SUBSCRIPTIONS_PER_CONNECTION,
        }
    }
}

impl ListenerConfig {
    /// Replace the socket endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSocketUrl`] if the URL does not parse,
    /// is not `ws`/`wss`, or carries a query string.
    pub fn with_socket_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.socket_url = validate_socket_url(raw)?;
        Ok(self)
    }

    /// Replace the event type of interest
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }
}

/// Parse and validate a subscription socket URL.
///
/// The platform rejects parameterized connection URLs for this transport.
pub fn validate_socket_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidSocketUrl(e.to_string()))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConfigError::InvalidSocketUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    if url.query().is_some() {
        return Err(ConfigError::InvalidSocketUrl(
            "query parameters are not allowed".to_string(),
        ));
    }

    Ok(url)
}

// =============================================================================
// Relay (binary) configuration
// =============================================================================

/// Full configuration for the relay binary
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Webhook receiver settings
    pub webhook: WebhookConfig,
    /// Socket listener settings
    pub listener: ListenerConfig,
    /// Subscription REST base URL
    pub api_url: String,
    /// Platform application id; the socket listener is disabled without it
    pub client_id: Option<String>,
    /// Application-level bearer token used when no per-broadcaster token exists
    pub app_token: Option<String>,
    /// Broadcasters watched over the socket
    pub broadcaster_ids: Vec<String>,
    /// Per-broadcaster tokens
    pub broadcaster_tokens: HashMap<String, String>,
}

impl RelayConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] carrying [`ConfigError::MissingVar`] if
    /// `EVENTSUB_WEBHOOK_SECRET` is not set, or a validation error for
    /// malformed optional values.
    pub fn from_env() -> crate::Result<Self> {
        Ok(Self::from_lookup(|name| std::env::var(name).ok())?)
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let secret = lookup("EVENTSUB_WEBHOOK_SECRET")
            .ok_or(ConfigError::MissingVar("EVENTSUB_WEBHOOK_SECRET"))?;
        let mut webhook = WebhookConfig::new(secret)?;

        if let Some(path) = get("EVENTSUB_WEBHOOK_PATH") {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    name: "EVENTSUB_WEBHOOK_PATH",
                    reason: "must start with '/'".to_string(),
                });
            }
            webhook.path = path;
        }

        if let Some(raw) = get("EVENTSUB_DEDUP_CAPACITY") {
            let capacity = parse_positive("EVENTSUB_DEDUP_CAPACITY", &raw)?;
            webhook.dedup_capacity = capacity as usize;
        }

        if let Some(raw) = get("EVENTSUB_REPLAY_WINDOW_SECS") {
            let secs = parse_positive("EVENTSUB_REPLAY_WINDOW_SECS", &raw)?;
            webhook.replay_window = Duration::from_secs(secs);
        }

        let mut listener = ListenerConfig::default();
        if let Some(raw) = get("EVENTSUB_SOCKET_URL") {
            listener = listener.with_socket_url(&raw)?;
        }
        if let Some(event_type) = get("EVENTSUB_EVENT_TYPE") {
            listener = listener.with_event_type(event_type);
        }
        if let Some(raw) = get("EVENTSUB_SUBSCRIBE_TIMEOUT_SECS") {
            let secs = parse_positive("EVENTSUB_SUBSCRIBE_TIMEOUT_SECS", &raw)?;
            listener.subscribe_timeout = Duration::from_secs(secs);
        }

        let broadcaster_ids = get("EVENTSUB_BROADCASTER_IDS")
            .map(|raw| parse_id_list(&raw))
            .unwrap_or_default();

        let broadcaster_tokens = match get("EVENTSUB_BROADCASTER_TOKENS") {
            Some(raw) => parse_token_pairs(&raw)?,
            None => HashMap::new(),
        };

        let client_id = get("EVENTSUB_CLIENT_ID");
        if client_id.is_none() && !broadcaster_ids.is_empty() {
            warn!("EVENTSUB_BROADCASTER_IDS set without EVENTSUB_CLIENT_ID; socket listener disabled");
        }

        Ok(Self {
            webhook,
            listener,
            api_url: get("EVENTSUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            client_id,
            app_token: get("EVENTSUB_APP_TOKEN"),
            broadcaster_ids,
            broadcaster_tokens,
        })
    }

    /// Create a test configuration (for testing only)
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            webhook: WebhookConfig::new("test-secret-for-unit-tests-only")
                .expect("non-empty secret"),
            listener: ListenerConfig::default(),
            api_url: DEFAULT_API_URL.to_string(),
            client_id: Some("test-client".to_string()),
            app_token: None,
            broadcaster_ids: vec!["1001".to_string()],
            broadcaster_tokens: HashMap::new(),
        }
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let value = raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
        name,
        reason: e.to_string(),
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(value)
}

/// Split a comma-separated id list, dropping blanks.
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_token_pairs(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut tokens = HashMap::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (id, token) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
            name: "EVENTSUB_BROADCASTER_TOKENS",
            reason: "expected comma-separated id=token pairs".to_string(),
        })?;

        let (id, token) = (id.trim(), token.trim());
        if id.is_empty() || token.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "EVENTSUB_BROADCASTER_TOKENS",
                reason: "id and token must both be non-empty".to_string(),
            });
        }

        tokens.insert(id.to_string(), token.to_string());
    }

    Ok(tokens)
}
