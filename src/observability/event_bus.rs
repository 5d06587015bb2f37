//! Tokio broadcast event bus for business events.
//!
//! Producers publish without waiting for delivery; the webhook dispatcher
//! subscribes and drains events in order.

use crate::models::{EventPayload, TenantId};
use std::sync::OnceLock;
use tokio::sync::broadcast;

const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// A business event raised by the shop application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessEvent {
    /// Tenant the event belongs to.
    pub tenant_id: TenantId,
    /// Event name, such as `quote.approved`.
    pub event: String,
    /// Opaque event data.
    pub payload: EventPayload,
}

impl BusinessEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<TenantId>,
        event: impl Into<String>,
        payload: EventPayload,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Central event bus for broadcasting business events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusinessEvent>,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort).
    ///
    /// Never blocks and never fails the caller; an event published while
    /// nobody listens is dropped and counted.
    #[allow(clippy::cast_precision_loss)]
    pub fn publish(&self, event: BusinessEvent) {
        metrics::counter!("event_bus_publish_total").increment(1);
        match self.sender.send(event) {
            Ok(_) => {
                metrics::gauge!("event_bus_queue_depth").set(self.sender.len() as f64);
            },
            Err(_) => {
                metrics::counter!("event_bus_publish_failed_total").increment(1);
                tracing::debug!("Business event published with no subscribers");
            },
        }
    }

    /// Subscribes to the event bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusinessEvent> {
        metrics::counter!("event_bus_subscriptions_total").increment(1);
        self.sender.subscribe()
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

static GLOBAL_EVENT_BUS: OnceLock<EventBus> = OnceLock::new();

/// Returns the global event bus, initializing it on first use.
#[must_use]
pub fn global_event_bus() -> &'static EventBus {
    GLOBAL_EVENT_BUS.get_or_init(EventBus::default)
}
