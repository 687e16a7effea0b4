//! Transport-independent notification dispatch
//!
//! Both transports end in the same place: a normalized [`Envelope`], a
//! broadcaster identity pulled out by a fixed field priority, and a
//! registered [`EventHandler`] invoked off the transport's own task.
//!
//! - [`envelope`]: wire-shape normalization and identity extraction
//! - [`registry`]: event-type to handler map and the guarded invoke path
//! - [`queue`]: ordered background worker for the socket transport

pub mod envelope;
pub mod queue;
pub mod registry;

pub use envelope::{
    extract_broadcaster_id, extract_broadcaster_login, BroadcasterEvent, BroadcasterIdentity,
    Envelope, Metadata,
};
pub use queue::{DispatchQueue, DispatchWorker};
pub use registry::{invoke_guarded, CallbackRegistry, DispatchOutcome, EventHandler, LoggingHandler};
