//! Event dispatcher for routing business events to webhooks.
//!
//! # Architecture
//!
//! ```text
//! producer --[publish]--> EventBus --[subscribe]--> EventDispatcher
//!                                                        |
//!                                           find_active_subscriptions
//!                                                        |
//!                                                        v
//!                                     RetryScheduler (one subscription at a time)
//! ```
//!
//! A failing subscription never affects the others, and nothing a
//! subscriber does can fail the producer.

use super::retry::{DeliveryResult, RetryScheduler};
use crate::models::{EventPayload, Subscription, TenantId};
use crate::observability::{BusinessEvent, EventBus};
use crate::storage::SubscriptionStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Counts for one dispatched event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Subscriptions that matched the event.
    pub matched: usize,
    /// Deliveries that succeeded.
    pub delivered: usize,
    /// Deliveries that failed or hit a store fault.
    pub failed: usize,
}

/// Fans an event out to every matching subscription of its tenant.
pub struct EventDispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    scheduler: Arc<RetryScheduler>,
}

impl EventDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, scheduler: Arc<RetryScheduler>) -> Self {
        Self {
            subscriptions,
            scheduler,
        }
    }

    /// Runs the dispatcher, listening for events from the event bus.
    ///
    /// Long-running; returns when every sender of the bus is dropped.
    pub async fn run(&self, event_bus: &EventBus) {
        self.consume(event_bus.subscribe()).await;
    }

    /// Dispatches events from an existing bus receiver until the bus closes.
    pub async fn consume(&self, mut receiver: broadcast::Receiver<BusinessEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    self.handle_event(&event).await;
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    metrics::counter!("webhook_events_lagged_total").increment(skipped);
                    tracing::warn!(
                        skipped = skipped,
                        "Webhook dispatcher lagged behind event bus"
                    );
                },
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, webhook dispatcher shutting down");
                    break;
                },
            }
        }
    }

    /// Dispatches one bus event.
    pub async fn handle_event(&self, event: &BusinessEvent) -> DispatchSummary {
        self.dispatch(&event.tenant_id, &event.event, &event.payload)
            .await
    }

    /// Delivers `event` to every active subscription of `tenant_id` that
    /// lists it, one after another. Never fails.
    pub async fn dispatch(
        &self,
        tenant_id: &TenantId,
        event: &str,
        payload: &EventPayload,
    ) -> DispatchSummary {
        metrics::counter!("webhook_events_received_total", "event_type" => event.to_string())
            .increment(1);

        let matching = match self.subscriptions.find_active_subscriptions(tenant_id, event) {
            Ok(matching) => matching,
            Err(e) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    event = %event,
                    error = %e,
                    "Failed to look up webhook subscriptions"
                );
                return DispatchSummary::default();
            },
        };

        let mut summary = DispatchSummary {
            matched: matching.len(),
            ..DispatchSummary::default()
        };
        if matching.is_empty() {
            tracing::debug!(tenant_id = %tenant_id, event = %event, "No webhooks subscribed");
            return summary;
        }

        tracing::info!(
            tenant_id = %tenant_id,
            event = %event,
            matched = summary.matched,
            "Dispatching webhook event"
        );

        for subscription in &matching {
            if self.dispatch_to_webhook(subscription, event, payload).await {
                summary.delivered += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::info!(
            tenant_id = %tenant_id,
            event = %event,
            delivered = summary.delivered,
            failed = summary.failed,
            "Webhook event dispatched"
        );

        summary
    }

    /// Delivers to one subscription, returning `true` on success.
    async fn dispatch_to_webhook(
        &self,
        subscription: &Subscription,
        event: &str,
        payload: &EventPayload,
    ) -> bool {
        let start = std::time::Instant::now();

        metrics::counter!(
            "webhook_deliveries_total",
            "event_type" => event.to_string()
        )
        .increment(1);

        let result = self.scheduler.deliver(subscription, event, payload).await;

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("webhook_delivery_duration_ms").record(duration_ms);

        match result {
            Ok(DeliveryResult::Delivered(success)) => {
                metrics::counter!("webhook_deliveries_success_total").increment(1);

                tracing::debug!(
                    webhook_id = %subscription.id,
                    attempt_id = %success.attempt_id,
                    event = %event,
                    status_code = success.status_code,
                    tries = success.tries,
                    "Webhook delivered successfully"
                );
                true
            },
            Ok(DeliveryResult::Failed(failure)) => {
                metrics::counter!("webhook_deliveries_failed_total").increment(1);

                tracing::warn!(
                    webhook_id = %subscription.id,
                    attempt_id = %failure.attempt_id,
                    event = %event,
                    status_code = ?failure.status_code,
                    tries = failure.tries,
                    error = %failure.error,
                    "Webhook delivery failed"
                );
                false
            },
            Err(e) => {
                metrics::counter!("webhook_deliveries_error_total").increment(1);

                tracing::error!(
                    webhook_id = %subscription.id,
                    event = %event,
                    error = %e,
                    "Webhook delivery error"
                );
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSubscription, SubscriptionId};
    use crate::storage::{AttemptStore, SqliteWebhookStore};
    use crate::webhooks::RetryPolicy;
    use crate::{Error, Result};
    use chrono::{DateTime, Utc};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct BrokenSubscriptions;

    impl SubscriptionStore for BrokenSubscriptions {
        fn find_active_subscriptions(&self, _: &TenantId, _: &str) -> Result<Vec<Subscription>> {
            Err(Error::operation("find_active_subscriptions", "database is locked"))
        }

        fn touch_last_triggered(&self, _: &SubscriptionId, _: DateTime<Utc>) -> Result<()> {
            Ok(())
        }

        fn insert_subscription(&self, _: NewSubscription) -> Result<Subscription> {
            Err(Error::operation("insert_subscription", "read only"))
        }

        fn get_subscription(&self, _: &SubscriptionId) -> Result<Option<Subscription>> {
            Ok(None)
        }

        fn list_subscriptions(&self, _: &TenantId) -> Result<Vec<Subscription>> {
            Ok(Vec::new())
        }

        fn set_active(&self, id: &SubscriptionId, _: bool) -> Result<()> {
            Err(Error::NotFound(id.to_string()))
        }
    }

    fn dispatcher_for(store: &Arc<SqliteWebhookStore>) -> EventDispatcher {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(5));
        let scheduler =
            RetryScheduler::new(store.clone(), store.clone(), policy).expect("scheduler");
        EventDispatcher::new(store.clone(), Arc::new(scheduler))
    }

    fn payload() -> EventPayload {
        EventPayload::from_json_str(r#"{"vehicle":"AB-123"}"#).expect("payload")
    }

    #[tokio::test]
    async fn test_dispatch_without_subscribers() {
        let store = Arc::new(SqliteWebhookStore::in_memory().expect("store"));
        let summary = dispatcher_for(&store)
            .dispatch(&TenantId::new("shop-a"), "vehicle.checked_in", &payload())
            .await;
        assert_eq!(summary, DispatchSummary::default());
    }

    #[tokio::test]
    async fn test_dispatch_continues_after_failing_subscriber() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(SqliteWebhookStore::in_memory().expect("store"));
        for route in ["/broken", "/ok"] {
            store
                .insert_subscription(NewSubscription::new(
                    "shop-a",
                    format!("{}{route}", server.uri()),
                    "secret",
                    ["vehicle.checked_in"],
                ))
                .expect("subscription");
        }

        let summary = dispatcher_for(&store)
            .dispatch(&TenantId::new("shop-a"), "vehicle.checked_in", &payload())
            .await;

        assert_eq!(
            summary,
            DispatchSummary {
                matched: 2,
                delivered: 1,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_swallows_lookup_failure() {
        let store = Arc::new(SqliteWebhookStore::in_memory().expect("store"));
        let scheduler = RetryScheduler::new(store.clone(), store, RetryPolicy::default())
            .expect("scheduler");
        let dispatcher = EventDispatcher::new(Arc::new(BrokenSubscriptions), Arc::new(scheduler));

        let summary = dispatcher
            .dispatch(&TenantId::new("shop-a"), "invoice.paid", &payload())
            .await;
        assert_eq!(summary, DispatchSummary::default());
    }

    #[tokio::test]
    async fn test_consume_until_bus_closed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(SqliteWebhookStore::in_memory().expect("store"));
        let sub = store
            .insert_subscription(NewSubscription::new(
                "shop-a",
                server.uri(),
                "secret",
                ["invoice.paid"],
            ))
            .expect("subscription");

        let dispatcher = dispatcher_for(&store);
        let bus = EventBus::new(16);
        let receiver = bus.subscribe();
        let handle = tokio::spawn(async move { dispatcher.consume(receiver).await });

        bus.publish(BusinessEvent::new("shop-a", "invoice.paid", payload()));
        drop(bus);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dispatcher stops when bus closes")
            .expect("dispatcher task");

        let stats = store.attempt_stats(&sub.id).expect("stats");
        assert_eq!(stats.success, 1);
    }
}
