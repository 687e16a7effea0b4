//! EventSub Relay - authenticated ingestion of live-stream event notifications
//!
//! The platform delivers the same logical notification over two unreliable
//! transports: a signed HTTP webhook push and a long-lived subscription
//! socket. This crate turns either into one handler invocation.
//!
//! # Features
//!
//! - **Webhook**: HMAC-SHA256 verification, replay window, bounded dedup,
//!   challenge handshake, fire-and-forget dispatch
//! - **Socket**: session handshake, per-broadcaster subscriptions, reconnect
//!   with a fixed retry delay, ordered dispatch
//! - **Dispatch**: one registry of typed handlers shared by both paths
//!
//! # Architecture
//!
//! ```text
//! HTTP POST ──▶ WebhookReceiver ──┐
//!   (signature, replay, dedup)    │
//!                                 ├──▶ Envelope ──▶ CallbackRegistry ──▶ EventHandler
//! socket frame ──▶ SocketListener ┘   (identity      (event type)
//!   (welcome, subscribe, reconnect)    extraction)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eventsub_relay::dispatch::LoggingHandler;
//! use eventsub_relay::webhook::{webhook_router, WebhookReceiver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let receiver = WebhookReceiver::with_secret("s3cRe7")?;
//!     receiver.register("stream.offline", LoggingHandler);
//!
//!     let app = webhook_router(Arc::new(receiver), "/eventsub");
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod socket;
pub mod webhook;

// Re-exports for convenience
pub use config::{ListenerConfig, RelayConfig, WebhookConfig};
pub use dispatch::{BroadcasterEvent, CallbackRegistry, EventHandler};
pub use error::{Error, Result};
pub use socket::{HelixClient, SocketListener, TokenResolver};
pub use webhook::{DedupCache, ReplayGuard, SignatureVerifier, WebhookReceiver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
