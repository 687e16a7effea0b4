//! Ordered background dispatch
//!
//! Transport read loops must never wait on consumer callbacks. They hand
//! events to a [`DispatchQueue`] and move on; a [`DispatchWorker`] drains the
//! queue on its own task, one event at a time, so arrival order is kept.
//!
//! ```text
//! frame read ──> enqueue ──> (returns immediately)
//!                   │
//!                   v
//!             DispatchWorker ──> invoke_guarded ──> EventHandler
//! ```

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;

use crate::dispatch::envelope::BroadcasterEvent;
use crate::dispatch::registry::{invoke_guarded, EventHandler};

struct DispatchJob {
    handler: Arc<dyn EventHandler>,
    event: BroadcasterEvent,
}

/// Sending half: cheap to clone, never blocks
#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<DispatchJob>,
}

/// Receiving half; run it on its own task
pub struct DispatchWorker {
    receiver: mpsc::UnboundedReceiver<DispatchJob>,
}

impl DispatchQueue {
    /// Create a queue and the worker that drains it
    pub fn new() -> (Self, DispatchWorker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, DispatchWorker { receiver })
    }

    /// Schedule `event` for `handler`.
    ///
    /// Returns `false` if the worker has gone away.
    pub fn enqueue(&self, handler: Arc<dyn EventHandler>, event: BroadcasterEvent) -> bool {
        self.sender.send(DispatchJob { handler, event }).is_ok()
    }
}

impl DispatchWorker {
    /// Drain the queue until every [`DispatchQueue`] handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!("Dispatch worker started");

        while let Some(job) = self.receiver.recv().await {
            let outcome = invoke_guarded(job.handler, job.event).await;
            counter!("eventsub_dispatch_total", "outcome" => outcome.as_str()).increment(1);
        }

        tracing::debug!("Dispatch worker shutting down");
    }
}
