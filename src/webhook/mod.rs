//! Signed webhook transport
//!
//! Verification pieces are independent and reusable:
//!
//! - [`signature`]: HMAC-SHA256 over id, timestamp and body
//! - [`replay`]: freshness window on the declared timestamp
//! - [`dedup`]: bounded FIFO of recently seen message ids
//!
//! [`receiver`] composes them with the callback registry, and [`handler`]
//! mounts the receiver on an axum router.

pub mod dedup;
pub mod error;
pub mod handler;
pub mod receiver;
pub mod replay;
pub mod signature;

pub use dedup::DedupCache;
pub use error::WebhookError;
pub use handler::{webhook_handler, webhook_router};
pub use receiver::{
    MessageType, WebhookAck, WebhookReceiver, HEADER_MESSAGE_ID, HEADER_MESSAGE_SIGNATURE,
    HEADER_MESSAGE_TIMESTAMP, HEADER_MESSAGE_TYPE, HEADER_SUBSCRIPTION_TYPE,
};
pub use replay::ReplayGuard;
pub use signature::{SignatureVerifier, SIGNATURE_PREFIX};
