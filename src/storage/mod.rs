//! Storage layer abstraction.
//!
//! Two stores back the delivery engine:
//! - **Subscriptions**: tenant registrations, read-only to delivery except for
//!   `last_triggered_at`
//! - **Attempts**: the durable delivery log, written only by the engine
//!
//! Both are implemented by [`SqliteWebhookStore`].

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteWebhookStore;
pub use traits::{AttemptStore, SubscriptionStore};
