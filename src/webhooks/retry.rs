//! Bounded retries with exponential backoff.
//!
//! One call to [`RetryScheduler::deliver`] is one delivery episode: it
//! creates a single attempt row before the first HTTP try and updates that
//! row in place after every try until it reaches `success` or `failed`.
//!
//! # Backoff
//!
//! With the default policy (3 tries, 1 s base delay) a delivery that keeps
//! failing transiently waits 1 s after the first try and 2 s after the
//! second. Permanent failures stop immediately.

use super::classify::{classify, is_retryable};
use super::delivery::{DeliveryAttemptExecutor, DeliveryOutcome};
use crate::models::{
    AttemptId, AttemptStatus, AttemptUpdate, EventPayload, Subscription, SubscriptionId,
};
use crate::storage::{AttemptStore, SubscriptionStore};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Retry and request settings for deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// HTTP tries per delivery, including the first.
    pub max_attempts: u32,
    /// Delay before the second try; doubles for every further try.
    pub base_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum stored response body size in bytes.
    pub response_body_limit: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(Self::DEFAULT_BASE_DELAY_MS),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            response_body_limit: Self::DEFAULT_RESPONSE_BODY_LIMIT,
        }
    }
}

impl RetryPolicy {
    /// Default number of tries.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    /// Default base delay in milliseconds.
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
    /// Default request timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
    /// Default response body limit in bytes.
    pub const DEFAULT_RESPONSE_BODY_LIMIT: usize = 1024;

    /// Sets the number of tries.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the response body limit.
    #[must_use]
    pub const fn with_response_body_limit(mut self, limit: usize) -> Self {
        self.response_body_limit = limit;
        self
    }

    /// Returns the delay after try number `attempt` (1-based).
    ///
    /// `base_delay * 2^(attempt - 1)`, with the exponent capped at 10.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Checks the policy for values that would make delivery impossible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `max_attempts` or `timeout` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidInput(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidInput(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Details of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySuccess {
    /// Subscription that was notified.
    pub webhook_id: SubscriptionId,
    /// Attempt row recording the delivery.
    pub attempt_id: AttemptId,
    /// 2xx status code received.
    pub status_code: u16,
    /// HTTP tries made.
    pub tries: u32,
}

/// A delivery that ended without a 2xx response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("delivery to webhook {webhook_id} failed after {tries} tries: {error}")]
pub struct DeliveryFailure {
    /// Subscription that could not be notified.
    pub webhook_id: SubscriptionId,
    /// Attempt row recording the failure.
    pub attempt_id: AttemptId,
    /// HTTP tries made.
    pub tries: u32,
    /// Last HTTP status code, if any response was received.
    pub status_code: Option<u16>,
    /// Last error message.
    pub error: String,
}

/// Final result of one delivery episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// The endpoint acknowledged the event.
    Delivered(DeliverySuccess),
    /// Retries were exhausted or the failure was permanent.
    Failed(DeliveryFailure),
}

impl DeliveryResult {
    /// Returns `true` for [`DeliveryResult::Delivered`].
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    /// Returns the attempt row id.
    #[must_use]
    pub const fn attempt_id(&self) -> &AttemptId {
        match self {
            Self::Delivered(success) => &success.attempt_id,
            Self::Failed(failure) => &failure.attempt_id,
        }
    }

    /// Returns the number of HTTP tries made.
    #[must_use]
    pub const fn tries(&self) -> u32 {
        match self {
            Self::Delivered(success) => success.tries,
            Self::Failed(failure) => failure.tries,
        }
    }
}

/// Runs the try/classify/backoff loop for one subscription.
pub struct RetryScheduler {
    executor: DeliveryAttemptExecutor,
    subscriptions: Arc<dyn SubscriptionStore>,
    attempts: Arc<dyn AttemptStore>,
    policy: RetryPolicy,
}

impl RetryScheduler {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is invalid or the HTTP client cannot be built.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        attempts: Arc<dyn AttemptStore>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        policy.validate()?;
        let executor = DeliveryAttemptExecutor::new(policy.timeout, policy.response_body_limit)?;

        Ok(Self {
            executor,
            subscriptions,
            attempts,
            policy,
        })
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delivers `event` to `subscription`, retrying transient failures.
    ///
    /// Delivery failures are reported as [`DeliveryResult::Failed`], not as
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns an error only if the attempt row cannot be created or its
    /// terminal status cannot be recorded. Interim `pending` updates that
    /// fail are logged and the tries continue.
    pub async fn deliver(
        &self,
        subscription: &Subscription,
        event: &str,
        payload: &EventPayload,
    ) -> Result<DeliveryResult> {
        let attempt_id = self
            .attempts
            .create_attempt(&subscription.id, event, payload)?;
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            let outcome = self.executor.attempt(subscription, event, payload).await;
            metrics::counter!("webhook_http_attempts_total", "outcome" => outcome.label())
                .increment(1);

            if let DeliveryOutcome::Success { status_code, body } = outcome {
                self.attempts.update_attempt(
                    &attempt_id,
                    &AttemptUpdate {
                        status: AttemptStatus::Success,
                        status_code: Some(status_code),
                        response: Some(body),
                        error: None,
                        tries: attempt,
                    },
                )?;
                self.touch_last_triggered(&subscription.id);

                tracing::debug!(
                    webhook_id = %subscription.id,
                    attempt_id = %attempt_id,
                    event = %event,
                    attempt = attempt,
                    status_code = status_code,
                    "Webhook try succeeded"
                );

                return Ok(DeliveryResult::Delivered(DeliverySuccess {
                    webhook_id: subscription.id.clone(),
                    attempt_id,
                    status_code,
                    tries: attempt,
                }));
            }

            let is_last = attempt >= max_attempts;
            let retryable = is_retryable(&outcome);
            let status = if is_last || !retryable {
                AttemptStatus::Failed
            } else {
                AttemptStatus::Pending
            };
            let error = outcome.error_message().unwrap_or_default();
            let status_code = outcome.status_code();

            let update = AttemptUpdate {
                status,
                status_code,
                response: outcome.body().map(str::to_string),
                error: Some(error.clone()),
                tries: attempt,
            };
            if status == AttemptStatus::Failed {
                self.attempts.update_attempt(&attempt_id, &update)?;
            } else if let Err(e) = self.attempts.update_attempt(&attempt_id, &update) {
                // The terminal update rewrites every column, so a lost interim one is recovered
                metrics::counter!("webhook_interim_update_errors_total").increment(1);
                tracing::warn!(
                    webhook_id = %subscription.id,
                    attempt_id = %attempt_id,
                    attempt = attempt,
                    error = %e,
                    "Failed to record interim webhook try"
                );
            }

            tracing::debug!(
                webhook_id = %subscription.id,
                attempt_id = %attempt_id,
                event = %event,
                attempt = attempt,
                status_code = ?status_code,
                kind = classify(&outcome).map_or("unknown", |k| k.as_str()),
                error = %error,
                "Webhook try failed"
            );

            if status == AttemptStatus::Failed {
                return Ok(DeliveryResult::Failed(DeliveryFailure {
                    webhook_id: subscription.id.clone(),
                    attempt_id,
                    tries: attempt,
                    status_code,
                    error,
                }));
            }

            tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }

    fn touch_last_triggered(&self, webhook_id: &SubscriptionId) {
        if let Err(e) = self
            .subscriptions
            .touch_last_triggered(webhook_id, Utc::now())
        {
            tracing::warn!(
                webhook_id = %webhook_id,
                error = %e,
                "Failed to record last trigger time"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AttemptStats, AttemptWithSubscription, DeliveryAttempt, NewSubscription, TenantId,
    };
    use crate::storage::SqliteWebhookStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use proptest::prelude::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_base_delay(Duration::from_millis(10))
    }

    fn setup(url: String) -> (Arc<SqliteWebhookStore>, RetryScheduler, Subscription) {
        let store = Arc::new(SqliteWebhookStore::in_memory().expect("store"));
        let subscription = store
            .insert_subscription(NewSubscription::new(
                "shop-a",
                url,
                "whsec",
                ["invoice.paid"],
            ))
            .expect("subscription");
        let scheduler =
            RetryScheduler::new(store.clone(), store.clone(), fast_policy()).expect("scheduler");
        (store, scheduler, subscription)
    }

    fn payload() -> EventPayload {
        EventPayload::from_json_str(r#"{"invoiceId":"inv-9"}"#).expect("payload")
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy.timeout, Duration::from_secs(10));
        assert_eq!(policy.response_body_limit, 1024);
    }

    #[test]
    fn test_delay_for_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(50), Duration::from_millis(1_024_000));
    }

    #[test]
    fn test_validate_policy() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::default().with_max_attempts(0).validate().is_err());
        assert!(
            RetryPolicy::default()
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_deliver_success_first_try() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let (store, scheduler, sub) = setup(server.uri());
        let result = scheduler
            .deliver(&sub, "invoice.paid", &payload())
            .await
            .expect("deliver");

        assert!(result.is_delivered());
        assert_eq!(result.tries(), 1);

        let attempt = store
            .get_attempt(result.attempt_id())
            .expect("get")
            .expect("exists");
        assert_eq!(attempt.status, AttemptStatus::Success);
        assert_eq!(attempt.status_code, Some(200));
        assert_eq!(attempt.response.as_deref(), Some("ok"));

        let touched = store.get_subscription(&sub.id).expect("get").expect("exists");
        assert!(touched.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn test_deliver_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .expect(3)
            .mount(&server)
            .await;

        let (store, scheduler, sub) = setup(server.uri());
        let result = scheduler
            .deliver(&sub, "invoice.paid", &payload())
            .await
            .expect("deliver");

        let DeliveryResult::Failed(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.tries, 3);
        assert_eq!(failure.status_code, Some(503));
        assert_eq!(failure.webhook_id, sub.id);

        let attempt = store
            .get_attempt(&failure.attempt_id)
            .expect("get")
            .expect("exists");
        assert_eq!(attempt.status, AttemptStatus::Failed);
        assert_eq!(attempt.tries, 3);
        assert_eq!(attempt.error.as_deref(), Some("HTTP 503 response"));

        let history = store.attempt_history(&sub.id, 10).expect("history");
        assert_eq!(history.len(), 1);

        let untouched = store.get_subscription(&sub.id).expect("get").expect("exists");
        assert!(untouched.last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn test_deliver_permanent_failure_stops() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let (store, scheduler, sub) = setup(server.uri());
        let result = scheduler
            .deliver(&sub, "invoice.paid", &payload())
            .await
            .expect("deliver");

        assert!(!result.is_delivered());
        assert_eq!(result.tries(), 1);
        let attempt = store
            .get_attempt(result.attempt_id())
            .expect("get")
            .expect("exists");
        assert_eq!(attempt.status, AttemptStatus::Failed);
        assert_eq!(attempt.status_code, Some(404));
    }

    #[tokio::test]
    async fn test_deliver_recovers_after_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let (store, scheduler, sub) = setup(server.uri());
        let result = scheduler
            .deliver(&sub, "invoice.paid", &payload())
            .await
            .expect("deliver");

        assert!(result.is_delivered());
        assert_eq!(result.tries(), 3);
        let attempt = store
            .get_attempt(result.attempt_id())
            .expect("get")
            .expect("exists");
        assert_eq!(attempt.status, AttemptStatus::Success);
        assert_eq!(attempt.status_code, Some(201));
        assert_eq!(attempt.tries, 3);
        assert!(attempt.error.is_none());
    }

    #[tokio::test]
    async fn test_deliver_respects_custom_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(5)
            .mount(&server)
            .await;

        let (store, _, sub) = setup(server.uri());
        let scheduler = RetryScheduler::new(
            store.clone(),
            store,
            fast_policy()
                .with_max_attempts(5)
                .with_base_delay(Duration::from_millis(1)),
        )
        .expect("scheduler");

        let result = scheduler
            .deliver(&sub, "invoice.paid", &payload())
            .await
            .expect("deliver");
        assert_eq!(result.tries(), 5);
    }

    /// Attempt store that fails `pending` updates a fixed number of times.
    struct FlakyInterimStore {
        inner: Arc<SqliteWebhookStore>,
        pending_failures: AtomicU32,
    }

    impl AttemptStore for FlakyInterimStore {
        fn create_attempt(
            &self,
            webhook_id: &SubscriptionId,
            event: &str,
            payload: &EventPayload,
        ) -> Result<AttemptId> {
            self.inner.create_attempt(webhook_id, event, payload)
        }

        fn update_attempt(&self, id: &AttemptId, update: &AttemptUpdate) -> Result<()> {
            if update.status == AttemptStatus::Pending
                && self
                    .pending_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(Error::operation("update_attempt", "database is locked"));
            }
            self.inner.update_attempt(id, update)
        }

        fn find_failed_attempts(
            &self,
            tenant_id: &TenantId,
            limit: usize,
        ) -> Result<Vec<AttemptWithSubscription>> {
            self.inner.find_failed_attempts(tenant_id, limit)
        }

        fn get_attempt(&self, id: &AttemptId) -> Result<Option<DeliveryAttempt>> {
            self.inner.get_attempt(id)
        }

        fn attempt_history(
            &self,
            webhook_id: &SubscriptionId,
            limit: usize,
        ) -> Result<Vec<DeliveryAttempt>> {
            self.inner.attempt_history(webhook_id, limit)
        }

        fn attempt_stats(&self, webhook_id: &SubscriptionId) -> Result<AttemptStats> {
            self.inner.attempt_stats(webhook_id)
        }
    }

    fn flaky_setup(
        url: String,
        pending_failures: u32,
    ) -> (Arc<SqliteWebhookStore>, RetryScheduler, Subscription) {
        let (store, _, subscription) = setup(url);
        let attempts = Arc::new(FlakyInterimStore {
            inner: store.clone(),
            pending_failures: AtomicU32::new(pending_failures),
        });
        let scheduler =
            RetryScheduler::new(store.clone(), attempts, fast_policy()).expect("scheduler");
        (store, scheduler, subscription)
    }

    #[tokio::test]
    async fn test_interim_update_failure_keeps_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (store, scheduler, sub) = flaky_setup(server.uri(), 1);
        let result = scheduler
            .deliver(&sub, "invoice.paid", &payload())
            .await
            .expect("interim store fault is not fatal");

        assert!(result.is_delivered());
        assert_eq!(result.tries(), 3);
        let attempt = store
            .get_attempt(result.attempt_id())
            .expect("get")
            .expect("exists");
        assert_eq!(attempt.status, AttemptStatus::Success);
        assert_eq!(attempt.tries, 3);
    }

    #[tokio::test]
    async fn test_interim_update_failures_still_end_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let (store, scheduler, sub) = flaky_setup(server.uri(), u32::MAX);
        let result = scheduler
            .deliver(&sub, "invoice.paid", &payload())
            .await
            .expect("deliver");

        let DeliveryResult::Failed(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.tries, 3);

        let attempt = store
            .get_attempt(&failure.attempt_id)
            .expect("get")
            .expect("exists");
        assert_eq!(attempt.status, AttemptStatus::Failed);
        assert_eq!(attempt.tries, 3);
        assert_eq!(attempt.status_code, Some(500));
        assert_eq!(
            store
                .find_failed_attempts(&sub.tenant_id, 10)
                .expect("failed")
                .len(),
            1
        );
    }

    proptest! {
        #[test]
        fn prop_delay_doubles(base_ms in 1u64..10_000, attempt in 1u32..10) {
            let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(base_ms));
            prop_assert_eq!(
                policy.delay_for_attempt(attempt + 1),
                policy.delay_for_attempt(attempt) * 2
            );
        }
    }
}
