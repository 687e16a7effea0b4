//! Subscription socket transport
//!
//! - [`api`]: the platform seam ([`EventSubApi`]) and its Helix implementation
//! - [`frames`]: frame decoding
//! - [`token`]: per-broadcaster token lookup
//! - [`listener`]: the reconnecting connection state machine

pub mod api;
pub mod error;
pub mod frames;
pub mod listener;
pub mod token;

pub use api::{EventSubApi, FrameStream, HelixClient, SubscriptionRequest};
pub use error::{ApiError, SocketError};
pub use frames::Frame;
pub use listener::{ConnectionState, Session, SocketListener};
pub use token::{strip_auth_scheme, StaticTokenResolver, TokenResolver};
