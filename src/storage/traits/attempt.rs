//! Attempt store trait.

use crate::Result;
use crate::models::{
    AttemptId, AttemptStats, AttemptUpdate, AttemptWithSubscription, DeliveryAttempt,
    EventPayload, SubscriptionId, TenantId,
};

/// Durable log of delivery attempts.
///
/// Rows are created `pending` and updated in place until they reach a
/// terminal status. Rows are never deleted by the engine.
pub trait AttemptStore: Send + Sync {
    /// Creates a `pending` attempt with zero tries and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    fn create_attempt(
        &self,
        webhook_id: &SubscriptionId,
        event: &str,
        payload: &EventPayload,
    ) -> Result<AttemptId>;

    /// Overwrites the mutable fields of a `pending` attempt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the attempt does not exist, or
    /// [`crate::Error::OperationFailed`] if it is already terminal.
    fn update_attempt(&self, id: &AttemptId, update: &AttemptUpdate) -> Result<()>;

    /// Returns up to `limit` failed attempts of `tenant_id` whose subscription
    /// is still active, newest first, each joined with its current subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_failed_attempts(
        &self,
        tenant_id: &TenantId,
        limit: usize,
    ) -> Result<Vec<AttemptWithSubscription>>;

    /// Fetches an attempt by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_attempt(&self, id: &AttemptId) -> Result<Option<DeliveryAttempt>>;

    /// Returns the most recent attempts of a subscription, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn attempt_history(&self, webhook_id: &SubscriptionId, limit: usize)
    -> Result<Vec<DeliveryAttempt>>;

    /// Counts the attempts of a subscription by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn attempt_stats(&self, webhook_id: &SubscriptionId) -> Result<AttemptStats>;
}
