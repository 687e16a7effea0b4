//! Persistent subscription socket
//!
//! One connection at a time, each walking the same state machine:
//!
//! ```text
//! Connecting ──> AwaitingWelcome ──> Subscribing ──> Listening
//!      ^              │ timeout / wrong frame            │ close / error / reconnect frame
//!      │              v                                  v
//!      └──────── RetryWait (fixed delay) <────────────────┘
//!
//! stop() ──> Terminated (checked before each attempt, during the delay,
//!            while subscribing and between frames)
//! ```
//!
//! Every suspension point is bounded: the welcome wait and each
//! subscription request have deadlines, and only frame reads wait on the
//! platform indefinitely.
//!
//! Sessions are never reused: every attempt handshakes and subscribes from
//! scratch. Notifications go through one [`DispatchQueue`] per `run`, so
//! they reach the handler in arrival order and never block frame reads.

use std::sync::Arc;

use futures::StreamExt;
use metrics::counter;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ListenerConfig, RelayConfig};
use crate::dispatch::{DispatchQueue, EventHandler, Envelope};
use crate::handlers::RelayStats;
use crate::socket::api::{EventSubApi, FrameStream, HelixClient, SubscriptionRequest};
use crate::socket::error::{ApiError, SocketError};
use crate::socket::frames::Frame;
use crate::socket::token::{strip_auth_scheme, StaticTokenResolver, TokenResolver};

/// Where the listener currently is in its connection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// `run` has not been called
    Idle,
    /// Opening the socket
    Connecting,
    /// Socket open, waiting for the session welcome
    AwaitingWelcome,
    /// Creating subscriptions for the session
    Subscribing,
    /// Reading notifications
    Listening,
    /// Waiting out the retry delay after a failed attempt
    RetryWait,
    /// `run` has returned
    Terminated,
}

impl ConnectionState {
    /// Label used in logs and status output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingWelcome => "awaiting_welcome",
            Self::Subscribing => "subscribing",
            Self::Listening => "listening",
            Self::RetryWait => "retry_wait",
            Self::Terminated => "terminated",
        }
    }
}

/// A handshaken connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Platform session id
    pub session_id: String,
    /// Broadcasters successfully subscribed on this session
    pub subscribed_ids: Vec<String>,
}

/// Keeps a subscription socket open and feeds matching notifications to a
/// handler.
pub struct SocketListener {
    api: Arc<dyn EventSubApi>,
    resolver: Option<Arc<dyn TokenResolver>>,
    config: ListenerConfig,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    stats: Arc<RelayStats>,
}

impl SocketListener {
    /// Create a listener using `api` for sockets and subscriptions.
    pub fn new(api: Arc<dyn EventSubApi>, config: ListenerConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            api,
            resolver: None,
            config,
            cancel: CancellationToken::new(),
            state,
            stats: Arc::new(RelayStats::new()),
        }
    }

    /// Build the production listener from relay settings: a [`HelixClient`]
    /// bounded by the listener's subscribe timeout, with the configured
    /// per-broadcaster tokens.
    ///
    /// Returns `Ok(None)` when no client id or no broadcaster ids are set.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Api`] if the HTTP client cannot be built.
    pub fn from_relay_config(config: &RelayConfig) -> crate::Result<Option<Self>> {
        let Some(client_id) = config.client_id.as_deref() else {
            return Ok(None);
        };
        if config.broadcaster_ids.is_empty() {
            return Ok(None);
        }

        let api = HelixClient::new(
            config.api_url.as_str(),
            client_id,
            config.app_token.clone(),
            config.listener.subscribe_timeout,
        )?;
        let resolver = StaticTokenResolver::new(config.broadcaster_tokens.clone());

        Ok(Some(
            Self::new(Arc::new(api), config.listener.clone()).with_token_resolver(Arc::new(resolver)),
        ))
    }

    /// Resolve per-broadcaster tokens through `resolver`
    pub fn with_token_resolver(mut self, resolver: Arc<dyn TokenResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use an externally shared stats block
    pub fn with_stats(mut self, stats: Arc<RelayStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Ask `run` to return.
    ///
    /// Takes effect at the next check point; a blocked frame read is not
    /// interrupted. Abort the hosting task for an immediate stop.
    pub fn stop(&self) {
        info!("Socket listener stop requested");
        self.cancel.cancel();
    }

    /// Whether `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        self.stats.set_socket_state(state.as_str());
    }

    /// Connect, subscribe and dispatch until [`stop`](Self::stop) is called.
    ///
    /// Returns immediately, without connecting, if `broadcaster_ids` has no
    /// non-blank entries.
    pub async fn run(&self, broadcaster_ids: &[String], handler: Arc<dyn EventHandler>) {
        let targets = self.select_targets(broadcaster_ids);
        if targets.is_empty() {
            debug!("No broadcaster ids to watch; socket listener not started");
            return;
        }

        let (queue, worker) = DispatchQueue::new();
        let worker = tokio::spawn(worker.run());

        let mut attempt: u64 = 0;
        while !self.cancel.is_cancelled() {
            attempt += 1;

            match self.connect_once(attempt, &targets, &handler, &queue).await {
                Ok(()) => {
                    counter!("eventsub_socket_connections_total", "outcome" => "stopped").increment(1);
                    break;
                }
                Err(err) => {
                    counter!("eventsub_socket_connections_total", "outcome" => err.code()).increment(1);
                    self.stats.record_socket_failure();
                    warn!(
                        attempt,
                        error = %err,
                        retry_in = ?self.config.retry_delay,
                        "Socket connection ended"
                    );
                }
            }

            self.set_state(ConnectionState::RetryWait);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }

        drop(queue);
        if let Err(e) = worker.await {
            warn!(error = %e, "Dispatch worker ended abnormally");
        }

        self.set_state(ConnectionState::Terminated);
        info!("Socket listener terminated");
    }

    /// Trim, drop blanks and repeats, then apply the per-connection cap.
    fn select_targets(&self, broadcaster_ids: &[String]) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        for id in broadcaster_ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            if !targets.iter().any(|t| t == id) {
                targets.push(id.to_string());
            }
        }

        if targets.len() > self.config.max_subscriptions {
            warn!(
                requested = targets.len(),
                limit = self.config.max_subscriptions,
                "Too many broadcasters for one connection; extra ids ignored"
            );
            targets.truncate(self.config.max_subscriptions);
        }

        targets
    }

    /// One full connection cycle. `Ok` only when stopped while listening.
    async fn connect_once(
        &self,
        attempt: u64,
        targets: &[String],
        handler: &Arc<dyn EventHandler>,
        queue: &DispatchQueue,
    ) -> Result<(), SocketError> {
        self.set_state(ConnectionState::Connecting);
        debug!(attempt, url = %self.config.socket_url, "Opening subscription socket");
        let mut frames = self.api.connect(&self.config.socket_url).await?;

        self.set_state(ConnectionState::AwaitingWelcome);
        let session_id = self.await_welcome(&mut frames).await?;
        info!(attempt, session_id = %session_id, "Socket session established");
        self.stats.record_socket_session();

        self.set_state(ConnectionState::Subscribing);
        let session = self.subscribe_all(session_id, targets).await;
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        info!(
            session_id = %session.session_id,
            subscribed = session.subscribed_ids.len(),
            requested = targets.len(),
            "Subscriptions issued"
        );

        self.set_state(ConnectionState::Listening);
        self.listen(&session, &mut frames, handler, queue).await
    }

    async fn await_welcome(&self, frames: &mut FrameStream) -> Result<String, SocketError> {
        let first = tokio::time::timeout(self.config.welcome_timeout, frames.next())
            .await
            .map_err(|_| SocketError::WelcomeTimeout(self.config.welcome_timeout))?;

        let text = match first {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(e),
            None => return Err(SocketError::Closed),
        };

        match Frame::parse(&text)? {
            Frame::Welcome { session_id } => Ok(session_id),
            other => Err(SocketError::UnexpectedFrame(other.kind().to_string())),
        }
    }

    async fn subscribe_all(&self, session_id: String, targets: &[String]) -> Session {
        let mut subscribed_ids = Vec::with_capacity(targets.len());

        for broadcaster_id in targets {
            let auth_token = self.resolve_token(broadcaster_id).await;
            let request = SubscriptionRequest::for_broadcaster(
                session_id.as_str(),
                self.config.event_type.as_str(),
                broadcaster_id.as_str(),
                auth_token,
            );

            let deadline = self.config.subscribe_timeout;
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(deadline, self.api.subscribe(request)) => {
                    result.unwrap_or_else(|_| {
                        Err(ApiError::Request(format!("no response within {deadline:?}")))
                    })
                }
            };

            match outcome {
                Ok(()) => {
                    debug!(broadcaster_id = %broadcaster_id, "Subscribed");
                    subscribed_ids.push(broadcaster_id.clone());
                }
                Err(e) => warn!(
                    broadcaster_id = %broadcaster_id,
                    error = %e,
                    "Subscription failed; continuing with remaining broadcasters"
                ),
            }
        }

        Session {
            session_id,
            subscribed_ids,
        }
    }

    async fn resolve_token(&self, broadcaster_id: &str) -> Option<String> {
        let resolver = self.resolver.as_ref()?;
        let raw = resolver.resolve(broadcaster_id).await?;
        strip_auth_scheme(&raw)
    }

    async fn listen(
        &self,
        session: &Session,
        frames: &mut FrameStream,
        handler: &Arc<dyn EventHandler>,
        queue: &DispatchQueue,
    ) -> Result<(), SocketError> {
        while let Some(next) = frames.next().await {
            let text = next?;

            let frame = match Frame::parse(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(session_id = %session.session_id, error = %e, "Skipping undecodable frame");
                    continue;
                }
            };

            match frame {
                Frame::Keepalive => {}
                Frame::Notification(envelope) => self.enqueue(envelope, handler, queue),
                Frame::Reconnect { reconnect_url } => {
                    info!(session_id = %session.session_id, "Platform requested reconnect");
                    return Err(SocketError::ReconnectRequested { reconnect_url });
                }
                Frame::Revocation {
                    subscription_type,
                    reason,
                } => warn!(
                    session_id = %session.session_id,
                    subscription_type = ?subscription_type,
                    reason = ?reason,
                    "Subscription revoked"
                ),
                Frame::Welcome { .. } => {
                    debug!(session_id = %session.session_id, "Ignoring repeated session welcome");
                }
                Frame::Other(kind) => {
                    debug!(session_id = %session.session_id, message_type = %kind, "Ignoring frame");
                }
            }

            if self.cancel.is_cancelled() {
                return Ok(());
            }
        }

        Err(SocketError::Closed)
    }

    fn enqueue(&self, envelope: Envelope, handler: &Arc<dyn EventHandler>, queue: &DispatchQueue) {
        let message_id = envelope.metadata.message_id.clone().unwrap_or_default();

        if envelope.subscription_type() != Some(self.config.event_type.as_str()) {
            debug!(
                message_id = %message_id,
                subscription_type = ?envelope.subscription_type(),
                "Ignoring notification for other event type"
            );
            return;
        }

        let Some(identity) = envelope.broadcaster() else {
            warn!(message_id = %message_id, "Notification carries no broadcaster identity; dropping");
            counter!("eventsub_dispatch_total", "outcome" => "unidentifiable").increment(1);
            return;
        };

        let event = envelope.into_event(self.config.event_type.as_str(), identity);
        if queue.enqueue(handler.clone(), event) {
            self.stats.record_socket_notification();
        } else {
            warn!(message_id = %message_id, "Dispatch worker gone; notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::BroadcasterEvent;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use url::Url;

    /// Script for one connection: frames to yield, then whether to hang
    struct Script {
        frames: Vec<Result<String, SocketError>>,
        hang: bool,
    }

    #[derive(Default)]
    struct ScriptedApi {
        scripts: Mutex<VecDeque<Script>>,
        connects: Mutex<Vec<tokio::time::Instant>>,
        subscriptions: Mutex<Vec<SubscriptionRequest>>,
        failing_ids: Vec<String>,
        unanswered_ids: Vec<String>,
    }

    impl ScriptedApi {
        fn push(&self, frames: Vec<String>, hang: bool) {
            self.scripts.lock().push_back(Script {
                frames: frames.into_iter().map(Ok).collect(),
                hang,
            });
        }
    }

    #[async_trait::async_trait]
    impl EventSubApi for ScriptedApi {
        async fn connect(&self, _url: &Url) -> Result<FrameStream, SocketError> {
            self.connects.lock().push(tokio::time::Instant::now());
            let script = self
                .scripts
                .lock()
                .pop_front()
                .ok_or_else(|| SocketError::Connect("no more scripts".to_string()))?;

            let frames = futures::stream::iter(script.frames);
            Ok(if script.hang {
                frames.chain(futures::stream::pending()).boxed()
            } else {
                frames.boxed()
            })
        }

        async fn subscribe(&self, request: SubscriptionRequest) -> Result<(), ApiError> {
            let broadcaster_id = request.condition["broadcaster_user_id"].clone();
            self.subscriptions.lock().push(request);
            if self.unanswered_ids.contains(&broadcaster_id) {
                std::future::pending::<()>().await;
            }
            if self.failing_ids.contains(&broadcaster_id) {
                return Err(ApiError::Status {
                    status: 403,
                    body: "forbidden".to_string(),
                });
            }
            Ok(())
        }
    }

    fn welcome(session_id: &str) -> String {
        format!(
            r#"{{"metadata":{{"message_type":"session_welcome"}},"payload":{{"session":{{"id":"{session_id}"}}}}}}"#
        )
    }

    fn keepalive() -> String {
        r#"{"metadata":{"message_type":"session_keepalive"},"payload":{}}"#.to_string()
    }

    fn reconnect() -> String {
        r#"{"metadata":{"message_type":"session_reconnect"},"payload":{"session":{"reconnect_url":"wss://elsewhere/ws"}}}"#
            .to_string()
    }

    fn notification(sub_type: &str, broadcaster_id: &str) -> String {
        format!(
            r#"{{"metadata":{{"message_id":"n-{broadcaster_id}","message_type":"notification","subscription_type":"{sub_type}"}},
                "payload":{{"subscription":{{"type":"{sub_type}","condition":{{}}}},
                            "event":{{"broadcaster_user_id":"{broadcaster_id}","broadcaster_user_login":"login{broadcaster_id}"}}}}}}"#
        )
    }

    fn revocation() -> String {
        r#"{"metadata":{"message_type":"revocation","subscription_type":"stream.offline"},
            "payload":{"subscription":{"type":"stream.offline","status":"authorization_revoked"}}}"#
            .to_string()
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn channel_handler() -> (Arc<dyn EventHandler>, mpsc::UnboundedReceiver<BroadcasterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: Arc<dyn EventHandler> = Arc::new(move |event: BroadcasterEvent| {
            let tx = tx.clone();
            async move {
                tx.send(event)?;
                Ok::<(), anyhow::Error>(())
            }
        });
        (handler, rx)
    }

    #[tokio::test]
    async fn test_empty_ids_never_connect() {
        let api = Arc::new(ScriptedApi::default());
        let listener = SocketListener::new(api.clone(), ListenerConfig::default());
        let (handler, _rx) = channel_handler();

        listener.run(&ids(&["", "  "]), handler).await;

        assert!(api.connects.lock().is_empty());
        assert_eq!(listener.state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribes_and_dispatches_in_order() {
        let api = Arc::new(ScriptedApi {
            failing_ids: ids(&["2"]),
            ..Default::default()
        });
        api.push(
            vec![
                welcome("s-1"),
                keepalive(),
                notification("stream.offline", "1"),
                notification("stream.online", "1"),
                notification("stream.offline", "2"),
                notification("stream.offline", "3"),
            ],
            true,
        );

        let listener = Arc::new(SocketListener::new(api.clone(), ListenerConfig::default()));
        let (handler, mut rx) = channel_handler();
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["1", "2", " 1 ", "3"]), handler).await })
        };

        let mut seen = Vec::new();
        for _ in 0..3 {
            let event = rx.recv().await.unwrap();
            seen.push((event.broadcaster_id, event.broadcaster_login));
        }
        assert_eq!(
            seen,
            vec![
                ("1".to_string(), Some("login1".to_string())),
                ("2".to_string(), Some("login2".to_string())),
                ("3".to_string(), Some("login3".to_string())),
            ]
        );

        let subscribed: Vec<String> = api
            .subscriptions
            .lock()
            .iter()
            .map(|r| r.condition["broadcaster_user_id"].clone())
            .collect();
        assert_eq!(subscribed, ids(&["1", "2", "3"]));
        assert!(api.subscriptions.lock().iter().all(|r| r.session_id == "s-1"));
        assert_eq!(listener.state(), ConnectionState::Listening);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_welcome_timeout_then_retry_after_delay() {
        let api = Arc::new(ScriptedApi::default());
        api.push(vec![], true);
        api.push(vec![welcome("s-2")], true);

        let listener = Arc::new(SocketListener::new(api.clone(), ListenerConfig::default()));
        let mut state = listener.watch_state();
        let (handler, _rx) = channel_handler();
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["1"]), handler).await })
        };

        state.wait_for(|s| *s == ConnectionState::Listening).await.unwrap();

        let connects = api.connects.lock().clone();
        assert_eq!(connects.len(), 2);
        assert!(connects[1] - connects[0] >= Duration::from_secs(20));
        assert_eq!(listener.stats.socket_counters().failed_attempts, 1);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_welcome_first_frame_aborts_attempt() {
        let api = Arc::new(ScriptedApi::default());
        api.push(vec![keepalive()], true);
        api.push(vec![welcome("s-2")], true);

        let listener = Arc::new(SocketListener::new(api.clone(), ListenerConfig::default()));
        let mut state = listener.watch_state();
        let (handler, _rx) = channel_handler();
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["1"]), handler).await })
        };

        state.wait_for(|s| *s == ConnectionState::Listening).await.unwrap();
        assert_eq!(api.connects.lock().len(), 2);
        assert_eq!(api.subscriptions.lock().len(), 1);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_frame_starts_fresh_cycle() {
        let api = Arc::new(ScriptedApi::default());
        api.push(
            vec![welcome("s-1"), notification("stream.offline", "1"), reconnect()],
            false,
        );
        api.push(vec![welcome("s-2"), notification("stream.offline", "1")], true);

        let listener = Arc::new(SocketListener::new(api.clone(), ListenerConfig::default()));
        let (handler, mut rx) = channel_handler();
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["1"]), handler).await })
        };

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        let sessions: Vec<String> = api
            .subscriptions
            .lock()
            .iter()
            .map(|r| r.session_id.clone())
            .collect();
        assert_eq!(sessions, ids(&["s-1", "s-2"]));
        assert!(!listener.is_stopped());

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_run_during_retry_delay() {
        let api = Arc::new(ScriptedApi::default());
        api.push(vec![welcome("s-1"), notification("stream.offline", "9")], false);

        let listener = Arc::new(SocketListener::new(api.clone(), ListenerConfig::default()));
        let mut state = listener.watch_state();
        let (handler, mut rx) = channel_handler();
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["9"]), handler).await })
        };

        rx.recv().await.unwrap();
        state.wait_for(|s| *s == ConnectionState::RetryWait).await.unwrap();
        listener.stop();

        task.await.unwrap();
        assert_eq!(listener.state(), ConnectionState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_handler_does_not_end_connection() {
        let api = Arc::new(ScriptedApi::default());
        api.push(
            vec![
                welcome("s-1"),
                notification("stream.offline", "1"),
                notification("stream.offline", "2"),
            ],
            true,
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = move |event: BroadcasterEvent| {
            let tx = tx.clone();
            async move {
                tx.send(event.broadcaster_id.clone())?;
                if event.broadcaster_id == "1" {
                    anyhow::bail!("consumer failure");
                }
                Ok::<(), anyhow::Error>(())
            }
        };

        let listener = Arc::new(SocketListener::new(api.clone(), ListenerConfig::default()));
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["1", "2"]), Arc::new(handler)).await })
        };

        assert_eq!(rx.recv().await.as_deref(), Some("1"));
        assert_eq!(rx.recv().await.as_deref(), Some("2"));
        assert_eq!(api.connects.lock().len(), 1);

        task.abort();
    }

    #[test]
    fn test_targets_capped_after_dedup() {
        let api = Arc::new(ScriptedApi::default());
        let listener = SocketListener::new(api, ListenerConfig::default());

        let mut raw: Vec<String> = (0..40).map(|i| i.to_string()).collect();
        raw.insert(1, "0".to_string());
        let targets = listener.select_targets(&raw);

        assert_eq!(targets.len(), 30);
        assert_eq!(targets[0], "0");
        assert_eq!(targets[1], "1");
        assert_eq!(targets[29], "29");
    }

    struct MapResolver(HashMap<String, String>);

    #[async_trait::async_trait]
    impl TokenResolver for MapResolver {
        async fn resolve(&self, broadcaster_id: &str) -> Option<String> {
            self.0.get(broadcaster_id).cloned()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_resolved_and_stripped() {
        let api = Arc::new(ScriptedApi::default());
        api.push(vec![welcome("s-1")], true);

        let resolver = MapResolver(HashMap::from([("1".to_string(), "oauth:abc".to_string())]));
        let listener = Arc::new(
            SocketListener::new(api.clone(), ListenerConfig::default())
                .with_token_resolver(Arc::new(resolver)),
        );
        let mut state = listener.watch_state();
        let (handler, _rx) = channel_handler();
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["1", "2"]), handler).await })
        };

        state.wait_for(|s| *s == ConnectionState::Listening).await.unwrap();
        let tokens: Vec<Option<String>> = api
            .subscriptions
            .lock()
            .iter()
            .map(|r| r.auth_token.clone())
            .collect();
        assert_eq!(tokens, vec![Some("abc".to_string()), None]);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_revocation_and_undecodable_frames_keep_connection() {
        let api = Arc::new(ScriptedApi::default());
        api.push(
            vec![
                welcome("s-1"),
                revocation(),
                "{not json".to_string(),
                notification("stream.offline", "1"),
            ],
            true,
        );

        let listener = Arc::new(SocketListener::new(api.clone(), ListenerConfig::default()));
        let (handler, mut rx) = channel_handler();
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["1"]), handler).await })
        };

        let event = rx.recv().await.unwrap();
        assert_eq!(event.broadcaster_id, "1");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(api.connects.lock().len(), 1);
        assert_eq!(listener.state(), ConnectionState::Listening);
        assert_eq!(listener.stats.socket_counters().failed_attempts, 0);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_subscription_times_out_and_others_continue() {
        let api = Arc::new(ScriptedApi {
            unanswered_ids: ids(&["1"]),
            ..Default::default()
        });
        api.push(vec![welcome("s-1"), notification("stream.offline", "2")], true);

        let config = ListenerConfig::default();
        let deadline = config.subscribe_timeout;
        let listener = Arc::new(SocketListener::new(api.clone(), config));
        let mut state = listener.watch_state();
        let (handler, mut rx) = channel_handler();
        let started = tokio::time::Instant::now();
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["1", "2"]), handler).await })
        };

        state.wait_for(|s| *s == ConnectionState::Listening).await.unwrap();
        assert!(started.elapsed() >= deadline);

        let subscribed: Vec<String> = api
            .subscriptions
            .lock()
            .iter()
            .map(|r| r.condition["broadcaster_user_id"].clone())
            .collect();
        assert_eq!(subscribed, ids(&["1", "2"]));

        assert_eq!(rx.recv().await.unwrap().broadcaster_id, "2");
        assert_eq!(api.connects.lock().len(), 1);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_subscribing_ends_run() {
        let api = Arc::new(ScriptedApi {
            unanswered_ids: ids(&["1"]),
            ..Default::default()
        });
        api.push(vec![welcome("s-1")], true);

        let mut config = ListenerConfig::default();
        config.subscribe_timeout = Duration::from_secs(3600);
        let listener = Arc::new(SocketListener::new(api.clone(), config));
        let mut state = listener.watch_state();
        let (handler, _rx) = channel_handler();
        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(&ids(&["1", "2"]), handler).await })
        };

        state.wait_for(|s| *s == ConnectionState::Subscribing).await.unwrap();
        listener.stop();

        task.await.unwrap();
        assert_eq!(listener.state(), ConnectionState::Terminated);
        assert_eq!(api.connects.lock().len(), 1);
        assert!(api.subscriptions.lock().len() <= 1);
    }

    #[test]
    fn test_from_relay_config_needs_client_id_and_ids() {
        let config = RelayConfig::test_config();
        let listener = SocketListener::from_relay_config(&config).unwrap().unwrap();
        assert_eq!(listener.config.subscribe_timeout, config.listener.subscribe_timeout);
        assert!(listener.resolver.is_some());

        let mut without_client = RelayConfig::test_config();
        without_client.client_id = None;
        assert!(SocketListener::from_relay_config(&without_client).unwrap().is_none());

        let mut without_ids = RelayConfig::test_config();
        without_ids.broadcaster_ids.clear();
        assert!(SocketListener::from_relay_config(&without_ids).unwrap().is_none());
    }
}
