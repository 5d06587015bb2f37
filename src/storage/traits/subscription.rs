//! Subscription store trait.

use crate::Result;
use crate::models::{NewSubscription, Subscription, SubscriptionId, TenantId};
use chrono::{DateTime, Utc};

/// Access to webhook subscriptions.
pub trait SubscriptionStore: Send + Sync {
    /// Returns the active subscriptions of `tenant_id` that include `event`.
    ///
    /// Subscriptions of other tenants are never returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_active_subscriptions(
        &self,
        tenant_id: &TenantId,
        event: &str,
    ) -> Result<Vec<Subscription>>;

    /// Records a successful delivery time on a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription does not exist or the write fails.
    fn touch_last_triggered(&self, id: &SubscriptionId, at: DateTime<Utc>) -> Result<()>;

    /// Registers a new subscription.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the registration is invalid.
    fn insert_subscription(&self, new: NewSubscription) -> Result<Subscription>;

    /// Fetches a subscription by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>>;

    /// Lists all subscriptions of a tenant, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>>;

    /// Enables or disables a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the subscription does not exist.
    fn set_active(&self, id: &SubscriptionId, active: bool) -> Result<()>;
}
