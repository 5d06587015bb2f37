//! Storage traits.
//!
//! Stores are synchronous and shared as `Arc<dyn ...>` between the
//! dispatcher, the retry scheduler and the reprocessor.

mod attempt;
mod subscription;

pub use attempt::AttemptStore;
pub use subscription::SubscriptionStore;
