//! Bulk replay of failed deliveries.
//!
//! Reprocessing never touches the failed rows it reads. Every replay goes
//! through the normal [`RetryScheduler`] and therefore creates a fresh
//! attempt row with its own full retry budget.

use super::retry::{DeliveryResult, RetryScheduler};
use crate::Result;
use crate::models::TenantId;
use crate::storage::AttemptStore;
use serde::Serialize;
use std::sync::Arc;

/// Counts for one reprocessing run.
///
/// `succeeded + failed == retried` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReprocessSummary {
    /// Failed attempts that were replayed.
    pub retried: usize,
    /// Replays that were delivered.
    pub succeeded: usize,
    /// Replays that failed again or hit a store fault.
    pub failed: usize,
}

/// Replays a tenant's most recent failed attempts.
pub struct ManualReprocessor {
    attempts: Arc<dyn AttemptStore>,
    scheduler: Arc<RetryScheduler>,
}

impl ManualReprocessor {
    /// Creates a reprocessor.
    #[must_use]
    pub fn new(attempts: Arc<dyn AttemptStore>, scheduler: Arc<RetryScheduler>) -> Self {
        Self {
            attempts,
            scheduler,
        }
    }

    /// Replays up to `limit` failed attempts of `tenant_id`, newest first,
    /// against the subscriptions as they are now.
    ///
    /// Failures of individual replays are counted, never propagated.
    ///
    /// # Errors
    ///
    /// Returns an error only if the failed attempts cannot be loaded.
    pub async fn reprocess(&self, tenant_id: &TenantId, limit: usize) -> Result<ReprocessSummary> {
        let failed = self.attempts.find_failed_attempts(tenant_id, limit)?;
        let mut summary = ReprocessSummary::default();

        tracing::info!(
            tenant_id = %tenant_id,
            candidates = failed.len(),
            "Reprocessing failed webhook deliveries"
        );

        for item in &failed {
            summary.retried += 1;
            metrics::counter!("webhook_reprocess_total").increment(1);

            let result = self
                .scheduler
                .deliver(&item.subscription, &item.attempt.event, &item.attempt.payload)
                .await;

            match result {
                Ok(DeliveryResult::Delivered(success)) => {
                    summary.succeeded += 1;
                    tracing::debug!(
                        original_attempt_id = %item.attempt.id,
                        attempt_id = %success.attempt_id,
                        webhook_id = %item.subscription.id,
                        "Reprocessed delivery succeeded"
                    );
                },
                Ok(DeliveryResult::Failed(failure)) => {
                    summary.failed += 1;
                    tracing::warn!(
                        original_attempt_id = %item.attempt.id,
                        attempt_id = %failure.attempt_id,
                        webhook_id = %item.subscription.id,
                        error = %failure.error,
                        "Reprocessed delivery failed again"
                    );
                },
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        original_attempt_id = %item.attempt.id,
                        webhook_id = %item.subscription.id,
                        error = %e,
                        "Reprocessing error"
                    );
                },
            }
        }

        tracing::info!(
            tenant_id = %tenant_id,
            retried = summary.retried,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Reprocessing finished"
        );

        Ok(summary)
    }
}
