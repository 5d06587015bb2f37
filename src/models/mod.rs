//! Data models for shopbell.
//!
//! Subscriptions are owned by the management side of the shop application
//! and are read-only to the delivery engine, except for `last_triggered_at`.
//! Delivery attempts are written exclusively by the engine.

mod attempt;
mod ids;
mod payload;
mod subscription;

pub use attempt::{
    AttemptStats, AttemptStatus, AttemptUpdate, AttemptWithSubscription, DeliveryAttempt,
};
pub use ids::{AttemptId, SubscriptionId, TenantId};
pub use payload::EventPayload;
pub use subscription::{NewSubscription, Subscription};
