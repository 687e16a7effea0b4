//! Platform API seam
//!
//! [`EventSubApi`] is everything the listener needs from the platform: a way
//! to open the subscription socket and a way to create subscriptions on it.
//! [`HelixClient`] is the production implementation; tests script their own.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::socket::error::{ApiError, SocketError};

/// Text frames from one socket connection; the stream ends when the
/// connection closes.
pub type FrameStream = BoxStream<'static, Result<String, SocketError>>;

/// One subscription to create on a session
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// Session the subscription is bound to
    pub session_id: String,
    /// Event type, e.g. `stream.offline`
    pub sub_type: String,
    /// Subscription condition
    pub condition: HashMap<String, String>,
    /// Per-broadcaster token, already stripped of any scheme prefix
    #[serde(skip)]
    pub auth_token: Option<String>,
}

impl SubscriptionRequest {
    /// Request for `broadcaster_id` on `session_id`
    pub fn for_broadcaster(
        session_id: impl Into<String>,
        sub_type: impl Into<String>,
        broadcaster_id: impl Into<String>,
        auth_token: Option<String>,
    ) -> Self {
        let mut condition = HashMap::new();
        condition.insert("broadcaster_user_id".to_string(), broadcaster_id.into());
        Self {
            session_id: session_id.into(),
            sub_type: sub_type.into(),
            condition,
            auth_token,
        }
    }
}

impl fmt::Debug for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRequest")
            .field("session_id", &self.session_id)
            .field("sub_type", &self.sub_type)
            .field("condition", &self.condition)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Operations the socket listener performs against the platform
#[async_trait::async_trait]
pub trait EventSubApi: Send + Sync + 'static {
    /// Open the subscription socket at `url`.
    async fn connect(&self, url: &Url) -> Result<FrameStream, SocketError>;

    /// Create one subscription.
    async fn subscribe(&self, request: SubscriptionRequest) -> Result<(), ApiError>;
}

/// Upper bound on establishing the HTTP connection for a request
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Helix REST client plus websocket connector
#[derive(Clone)]
pub struct HelixClient {
    http: reqwest::Client,
    api_url: String,
    client_id: String,
    app_token: Option<String>,
}

impl HelixClient {
    /// Create a client against `api_url` (e.g. `https://api.twitch.tv/helix`).
    ///
    /// Every subscription request gives up after `request_timeout`, which
    /// surfaces as [`ApiError::Request`].
    ///
    /// # Errors
    ///
    /// [`ApiError::Request`] if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        client_id: impl Into<String>,
        app_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT.min(request_timeout))
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            app_token: app_token.filter(|t| !t.is_empty()),
        })
    }

    fn subscriptions_url(&self) -> String {
        format!("{}/eventsub/subscriptions", self.api_url)
    }
}

impl fmt::Debug for HelixClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelixClient")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field("app_token", &self.app_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait::async_trait]
impl EventSubApi for HelixClient {
    async fn connect(&self, url: &Url) -> Result<FrameStream, SocketError> {
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| SocketError::Connect(e.to_string()))?;

        let frames = ws
            .take_while(|msg| futures::future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(_) => None,
                    Err(e) => Some(Err(SocketError::Transport(e.to_string()))),
                }
            });

        Ok(frames.boxed())
    }

    async fn subscribe(&self, request: SubscriptionRequest) -> Result<(), ApiError> {
        let token = request
            .auth_token
            .clone()
            .or_else(|| self.app_token.clone())
            .ok_or(ApiError::MissingToken)?;

        let body = json!({
            "type": request.sub_type,
            "version": "1",
            "condition": request.condition,
            "transport": {
                "method": "websocket",
                "session_id": request.session_id,
            },
        });

        let response = self
            .http
            .post(self.subscriptions_url())
            .header("Client-Id", &self.client_id)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(sub_type = %request.sub_type, "Subscription created");
        Ok(())
    }
}
