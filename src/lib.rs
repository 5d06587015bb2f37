//! # Shopbell
//!
//! Outbound webhook delivery for a multi-tenant shop-management system.
//!
//! When a business action in the shop (a quote approved, an invoice paid, a
//! vehicle checked in) produces an event, shopbell notifies every endpoint a
//! tenant registered for that event. Each request body is signed with
//! HMAC-SHA256 so receivers can authenticate it, transient failures are
//! retried with exponential backoff, and every delivery episode is recorded
//! as an attempt row that operators can inspect and reprocess.
//!
//! ## Features
//!
//! - Tenant-scoped event-to-subscription matching
//! - Signed JSON delivery (`X-Webhook-Signature`, `X-Webhook-Event`)
//! - Bounded retries with exponential backoff and failure classification
//! - `SQLite` attempt audit trail with bulk manual reprocessing
//! - Fire-and-forget publishing through an in-process event bus
//!
//! ## Example
//!
//! ```rust,ignore
//! use shopbell::storage::SqliteWebhookStore;
//! use shopbell::webhooks::{EventPayload, RetryPolicy, WebhookService};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteWebhookStore::in_memory()?);
//! let service = WebhookService::new(store.clone(), store, RetryPolicy::default())?;
//! let payload = EventPayload::from_json_str(r#"{"quoteId":"q-1"}"#)?;
//! service.dispatch(&"tenant-1".into(), "quote.approved", &payload).await;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod storage;
pub mod webhooks;

// Re-exports for convenience
pub use config::ShopbellConfig;
pub use models::{
    AttemptId, AttemptStatus, DeliveryAttempt, NewSubscription, Subscription, SubscriptionId,
    TenantId,
};
pub use storage::{AttemptStore, SqliteWebhookStore, SubscriptionStore};
pub use webhooks::{
    DeliveryOutcome, DeliveryResult, EventPayload, ReprocessSummary, RetryPolicy, WebhookService,
};

/// Error type for shopbell operations.
///
/// Delivery failures are not errors: an endpoint that answers 500 three times
/// produces a [`DeliveryResult::Failed`] value. This type covers faults the
/// engine cannot treat as a delivery outcome.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed payload JSON, invalid config values, bad CLI arguments |
/// | `NotFound` | Unknown subscription or attempt id |
/// | `OperationFailed` | `SQLite` errors, filesystem I/O, HTTP client construction |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - An event payload is not valid JSON
    /// - A configuration value is out of range (zero retries, zero timeout)
    /// - A subscription URL is not http(s), or its secret is empty
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail or the connection lock is poisoned
    /// - Filesystem I/O errors occur (config, log file, database directory)
    /// - The HTTP client cannot be built
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and any displayable cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for shopbell operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis().max(0)
}
