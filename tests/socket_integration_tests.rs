//! Socket Integration Tests for eventsub-relay
//!
//! Runs the listener with the real [`HelixClient`] against a local
//! websocket server and a local subscription API.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --package eventsub-relay --test socket_integration_tests
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use futures::SinkExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use eventsub_relay::config::ListenerConfig;
use eventsub_relay::dispatch::{BroadcasterEvent, EventHandler};
use eventsub_relay::socket::{ConnectionState, HelixClient, SocketListener, StaticTokenResolver};

#[derive(Debug)]
struct CapturedSubscription {
    authorization: String,
    client_id: String,
    body: Value,
}

async fn spawn_subscription_api() -> (SocketAddr, mpsc::UnboundedReceiver<CapturedSubscription>) {
    let (tx, rx) = mpsc::unbounded_channel();

    async fn create(
        State(tx): State<mpsc::UnboundedSender<CapturedSubscription>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        let _ = tx.send(CapturedSubscription {
            authorization: header("authorization"),
            client_id: header("client-id"),
            body,
        });
        StatusCode::ACCEPTED
    }

    let app = Router::new()
        .route("/helix/eventsub/subscriptions", post(create))
        .with_state(tx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, rx)
}

/// Accepts connections and never writes a byte back
async fn spawn_silent_api() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

fn welcome(session_id: &str) -> Message {
    Message::text(
        json!({
            "metadata": {"message_id": "w-1", "message_type": "session_welcome",
                         "message_timestamp": "2024-01-01T00:00:00Z"},
            "payload": {"session": {"id": session_id, "status": "connected",
                                    "keepalive_timeout_seconds": 10, "reconnect_url": null}}
        })
        .to_string(),
    )
}

fn offline_notification(broadcaster_id: &str) -> Message {
    Message::text(
        json!({
            "metadata": {"message_id": format!("n-{broadcaster_id}"), "message_type": "notification",
                         "subscription_type": "stream.offline", "subscription_version": "1"},
            "payload": {
                "subscription": {"type": "stream.offline",
                                 "condition": {"broadcaster_user_id": broadcaster_id}},
                "event": {"broadcaster_user_id": broadcaster_id, "broadcaster_user_login": "caster"}
            }
        })
        .to_string(),
    )
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
async fn test_end_to_end_subscribe_and_dispatch() {
    let (api_addr, mut subscriptions) = spawn_subscription_api().await;

    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();
    let (close_tx, close_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let (stream, _) = ws_listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(welcome("session-e2e")).await.unwrap();
        ws.send(Message::text(
            r#"{"metadata":{"message_type":"session_keepalive"},"payload":{}}"#,
        ))
        .await
        .unwrap();
        ws.send(offline_notification("1")).await.unwrap();
        let _ = close_rx.await;
        let _ = ws.close(None).await;
    });

    let api = HelixClient::new(
        format!("http://{api_addr}/helix"),
        "client-abc",
        Some("app-token".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    let resolver = StaticTokenResolver::new(
        [("1".to_string(), "oauth:user-token".to_string())]
            .into_iter()
            .collect(),
    );
    let config = ListenerConfig::default()
        .with_socket_url(&format!("ws://{ws_addr}/ws"))
        .unwrap();
    let listener = Arc::new(
        SocketListener::new(Arc::new(api), config).with_token_resolver(Arc::new(resolver)),
    );

    let (handler, mut events) = channel_handler();
    let task = {
        let listener = listener.clone();
        let ids = vec!["1".to_string(), "2".to_string()];
        tokio::spawn(async move { listener.run(&ids, handler).await })
    };

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.broadcaster_id, "1");
    assert_eq!(event.broadcaster_login.as_deref(), Some("caster"));
    assert_eq!(event.message_id.as_deref(), Some("n-1"));

    let mut captured = Vec::new();
    for _ in 0..2 {
        captured.push(
            tokio::time::timeout(Duration::from_secs(5), subscriptions.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }

    assert_eq!(captured[0].authorization, "Bearer user-token");
    assert_eq!(captured[1].authorization, "Bearer app-token");
    for (sub, id) in captured.iter().zip(["1", "2"]) {
        assert_eq!(sub.client_id, "client-abc");
        assert_eq!(sub.body["type"], "stream.offline");
        assert_eq!(sub.body["version"], "1");
        assert_eq!(sub.body["condition"]["broadcaster_user_id"], id);
        assert_eq!(sub.body["transport"]["method"], "websocket");
        assert_eq!(sub.body["transport"]["session_id"], "session-e2e");
    }

    listener.stop();
    let _ = close_tx.send(());
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(listener.state(), ConnectionState::Terminated);
}

#[tokio::test]
async fn test_silent_server_times_out_and_retries() {
    let (api_addr, _subscriptions) = spawn_subscription_api().await;

    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    {
        let accepted = accepted.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = ws_listener.accept().await.unwrap();
                let n = accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    if n > 0 {
                        ws.send(welcome("session-2")).await.unwrap();
                    }
                    tokio::time::sleep(Duration::from_secs(30)).await;
                });
            }
        });
    }

    let api = HelixClient::new(
        format!("http://{api_addr}/helix"),
        "client-abc",
        Some("t".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    let mut config = ListenerConfig::default()
        .with_socket_url(&format!("ws://{ws_addr}/ws"))
        .unwrap();
    config.welcome_timeout = Duration::from_millis(200);
    config.retry_delay = Duration::from_millis(100);

    let listener = Arc::new(SocketListener::new(Arc::new(api), config));
    let mut state = listener.watch_state();
    let (handler, _events) = channel_handler();
    let task = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.run(&["1".to_string()], handler).await })
    };

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Listening),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 2);

    task.abort();
}

#[tokio::test]
async fn test_silent_subscription_api_does_not_block_listener() {
    let api_addr = spawn_silent_api().await;

    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();
    let (close_tx, close_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let (stream, _) = ws_listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(welcome("session-silent")).await.unwrap();
        ws.send(offline_notification("1")).await.unwrap();
        let _ = close_rx.await;
        let _ = ws.close(None).await;
    });

    let api = HelixClient::new(
        format!("http://{api_addr}/helix"),
        "client-abc",
        Some("t".to_string()),
        Duration::from_millis(300),
    )
    .unwrap();
    let config = ListenerConfig::default()
        .with_socket_url(&format!("ws://{ws_addr}/ws"))
        .unwrap();
    let listener = Arc::new(SocketListener::new(Arc::new(api), config));
    let mut state = listener.watch_state();

    let (handler, mut events) = channel_handler();
    let task = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.run(&["1".to_string(), "2".to_string()], handler).await })
    };

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Listening),
    )
    .await
    .expect("listener stuck before listening")
    .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.broadcaster_id, "1");

    listener.stop();
    let _ = close_tx.send(());
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("run did not return after stop")
        .unwrap();
    assert_eq!(listener.state(), ConnectionState::Terminated);
}
