//! Event-type callback registry and the shared dispatch path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::dispatch::envelope::{BroadcasterEvent, Envelope};

/// Consumer callback for normalized broadcaster events.
///
/// Errors are logged by the dispatch layer and never reach the transport.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Receive one normalized broadcaster event
    async fn handle(&self, event: BroadcasterEvent) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(BroadcasterEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: BroadcasterEvent) -> anyhow::Result<()> {
        (self)(event).await
    }
}

/// Result of routing one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler ran and returned `Ok`
    Delivered,
    /// Envelope has no subscription type
    MissingType,
    /// No handler registered for the subscription type
    Unroutable,
    /// No broadcaster id could be extracted
    Unidentifiable,
    /// Handler returned an error
    HandlerFailed,
    /// Handler panicked
    HandlerPanicked,
}

impl DispatchOutcome {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::MissingType => "missing_type",
            Self::Unroutable => "unroutable",
            Self::Unidentifiable => "unidentifiable",
            Self::HandlerFailed => "handler_failed",
            Self::HandlerPanicked => "handler_panicked",
        }
    }
}

/// Maps an event type to its handler.
///
/// One handler per type; registering again replaces the previous handler.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `event_type`, returning the handler it replaced.
    pub fn register<H: EventHandler>(
        &self,
        event_type: impl Into<String>,
        handler: H,
    ) -> Option<Arc<dyn EventHandler>> {
        self.register_shared(event_type, Arc::new(handler))
    }

    /// Install an already shared handler.
    pub fn register_shared(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Option<Arc<dyn EventHandler>> {
        let event_type = event_type.into();
        debug!(event_type = %event_type, "Registering event handler");
        self.handlers.write().insert(event_type, handler)
    }

    /// Handler for `event_type`, if any
    pub fn get(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.read().get(event_type).cloned()
    }

    /// Whether a handler exists for `event_type`
    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.read().contains_key(event_type)
    }

    /// Registered event types, sorted
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Route a normalized envelope to its handler and run it.
    pub async fn dispatch(&self, envelope: Envelope) -> DispatchOutcome {
        let outcome = match self.route(envelope) {
            Ok((handler, event)) => invoke_guarded(handler, event).await,
            Err(outcome) => outcome,
        };
        counter!("eventsub_dispatch_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    fn route(&self, envelope: Envelope) -> Result<(Arc<dyn EventHandler>, BroadcasterEvent), DispatchOutcome> {
        let message_id = envelope.metadata.message_id.clone().unwrap_or_default();

        let Some(event_type) = envelope.subscription_type().map(str::to_string) else {
            warn!(message_id = %message_id, "Notification has no subscription type; dropping");
            return Err(DispatchOutcome::MissingType);
        };

        let Some(handler) = self.get(&event_type) else {
            info!(
                message_id = %message_id,
                event_type = %event_type,
                "No handler registered for event type; dropping"
            );
            return Err(DispatchOutcome::Unroutable);
        };

        let Some(identity) = envelope.broadcaster() else {
            warn!(
                message_id = %message_id,
                event_type = %event_type,
                "Notification carries no broadcaster identity; dropping"
            );
            return Err(DispatchOutcome::Unidentifiable);
        };

        Ok((handler, envelope.into_event(event_type, identity)))
    }
}

/// Run `handler` on its own task so an error or panic stays contained to
/// this one event.
pub async fn invoke_guarded(handler: Arc<dyn EventHandler>, event: BroadcasterEvent) -> DispatchOutcome {
    let event_type = event.event_type.clone();
    let broadcaster_id = event.broadcaster_id.clone();

    match tokio::spawn(async move { handler.handle(event).await }).await {
        Ok(Ok(())) => {
            debug!(event_type = %event_type, broadcaster_id = %broadcaster_id, "Event delivered");
            DispatchOutcome::Delivered
        }
        Ok(Err(e)) => {
            warn!(
                event_type = %event_type,
                broadcaster_id = %broadcaster_id,
                error = %e,
                "Event handler failed"
            );
            DispatchOutcome::HandlerFailed
        }
        Err(join_err) => {
            error!(
                event_type = %event_type,
                broadcaster_id = %broadcaster_id,
                error = %join_err,
                "Event handler panicked"
            );
            DispatchOutcome::HandlerPanicked
        }
    }
}

/// Handler that logs every event it receives
#[derive(Clone)]
pub struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: BroadcasterEvent) -> anyhow::Result<()> {
        info!(
            event_type = %event.event_type,
            broadcaster_id = %event.broadcaster_id,
            broadcaster_login = ?event.broadcaster_login,
            message_id = ?event.message_id,
            "Broadcaster event received"
        );
        Ok(())
    }
}
