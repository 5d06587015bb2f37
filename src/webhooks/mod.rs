//! Outbound webhook delivery.
//!
//! When a business action produces an event, every active subscription of
//! the tenant that lists the event receives a signed HTTP POST. Transient
//! failures are retried with exponential backoff and every delivery episode
//! is recorded as an attempt row.
//!
//! # Architecture
//!
//! - **Signature** (`signature.rs`): HMAC-SHA256 body signing and verification
//! - **Classify** (`classify.rs`): transient vs permanent failures
//! - **Delivery** (`delivery.rs`): one signed HTTP try
//! - **Retry** (`retry.rs`): try/classify/backoff loop over one attempt row
//! - **Dispatcher** (`dispatcher.rs`): event to subscription fan-out
//! - **Reprocess** (`reprocess.rs`): bulk replay of failed attempts
//!
//! # Event Names
//!
//! Event names are opaque strings chosen by the shop application, such as
//! `quote.approved`, `invoice.paid` or `vehicle.checked_in`. The name
//! `webhook.test` is used by [`WebhookService::test_subscription`].

pub mod classify;
pub mod delivery;
pub mod dispatcher;
pub mod reprocess;
pub mod retry;
pub mod signature;

pub use crate::models::EventPayload;
pub use classify::{FailureKind, classify, is_retryable};
pub use delivery::{DeliveryAttemptExecutor, DeliveryOutcome, EVENT_HEADER};
pub use dispatcher::{DispatchSummary, EventDispatcher};
pub use reprocess::{ManualReprocessor, ReprocessSummary};
pub use retry::{DeliveryFailure, DeliveryResult, DeliverySuccess, RetryPolicy, RetryScheduler};
pub use signature::{SIGNATURE_HEADER, sign, verify};

use crate::config::ShopbellConfig;
use crate::models::{SubscriptionId, TenantId};
use crate::observability::EventBus;
use crate::storage::{AttemptStore, SqliteWebhookStore, SubscriptionStore};
use crate::{Error, Result};
use std::sync::Arc;

/// Event name used for test deliveries.
pub const TEST_EVENT: &str = "webhook.test";

/// Webhook service wiring stores, delivery, dispatch and reprocessing.
///
/// # Example
///
/// ```rust,ignore
/// use shopbell::webhooks::WebhookService;
///
/// let service = WebhookService::from_config(&config)?;
/// let _handle = service.start(&event_bus);
/// ```
pub struct WebhookService {
    subscriptions: Arc<dyn SubscriptionStore>,
    attempts: Arc<dyn AttemptStore>,
    scheduler: Arc<RetryScheduler>,
    dispatcher: Arc<EventDispatcher>,
    reprocessor: ManualReprocessor,
}

impl WebhookService {
    /// Creates a webhook service over the given stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is invalid or the HTTP client cannot be built.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        attempts: Arc<dyn AttemptStore>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let scheduler = Arc::new(RetryScheduler::new(
            Arc::clone(&subscriptions),
            Arc::clone(&attempts),
            policy,
        )?);
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&subscriptions),
            Arc::clone(&scheduler),
        ));
        let reprocessor = ManualReprocessor::new(Arc::clone(&attempts), Arc::clone(&scheduler));

        Ok(Self {
            subscriptions,
            attempts,
            scheduler,
            dispatcher,
            reprocessor,
        })
    }

    /// Creates a service backed by the `SQLite` store under the configured
    /// data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened.
    pub fn from_config(config: &ShopbellConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(SqliteWebhookStore::new(&config.database_path())?);
        Self::new(store.clone(), store, config.retry_policy())
    }

    /// Returns the subscription store.
    #[must_use]
    pub fn subscriptions(&self) -> &dyn SubscriptionStore {
        self.subscriptions.as_ref()
    }

    /// Returns the attempt store.
    #[must_use]
    pub fn attempts(&self) -> &dyn AttemptStore {
        self.attempts.as_ref()
    }

    /// Returns the active retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        self.scheduler.policy()
    }

    /// Delivers an event to every matching subscription of a tenant.
    ///
    /// Never fails; per-subscription outcomes are logged and counted.
    pub async fn dispatch(
        &self,
        tenant_id: &TenantId,
        event: &str,
        payload: &EventPayload,
    ) -> DispatchSummary {
        self.dispatcher.dispatch(tenant_id, event, payload).await
    }

    /// Replays up to `limit` failed attempts of a tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the failed attempts cannot be loaded.
    pub async fn reprocess(&self, tenant_id: &TenantId, limit: usize) -> Result<ReprocessSummary> {
        self.reprocessor.reprocess(tenant_id, limit).await
    }

    /// Sends a `webhook.test` event to one subscription, active or not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the subscription does not exist, or a
    /// store error if the attempt cannot be recorded.
    pub async fn test_subscription(&self, webhook_id: &SubscriptionId) -> Result<DeliveryResult> {
        let subscription = self
            .subscriptions
            .get_subscription(webhook_id)?
            .ok_or_else(|| Error::NotFound(format!("webhook subscription {webhook_id}")))?;

        let payload = EventPayload::from_serializable(&serde_json::json!({
            "test": true,
            "webhookId": webhook_id.as_str(),
            "message": "This is a test webhook delivery from shopbell",
        }))?;

        self.scheduler
            .deliver(&subscription, TEST_EVENT, &payload)
            .await
    }

    /// Starts the dispatcher as a background task fed by `event_bus`.
    ///
    /// The bus is subscribed before this returns, so no event published
    /// afterwards is missed. The task ends when the bus closes.
    #[must_use]
    pub fn start(&self, event_bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let receiver = event_bus.subscribe();

        tokio::spawn(async move {
            dispatcher.consume(receiver).await;
        })
    }
}
