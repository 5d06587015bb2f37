//! Delivery attempt audit records.

use super::ids::{AttemptId, SubscriptionId};
use super::payload::EventPayload;
use super::subscription::Subscription;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a delivery attempt.
///
/// An attempt is created `Pending` and moves exactly once to `Success` or
/// `Failed`. Retries within one delivery keep it `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    /// Delivery in progress or waiting for a retry.
    Pending,
    /// Delivery acknowledged with a 2xx response.
    Success,
    /// Delivery gave up.
    Failed,
}

impl AttemptStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for `Success` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(Error::InvalidInput(format!("Invalid attempt status: {s}"))),
        }
    }
}

/// One logical delivery episode for a subscription/event/payload triple.
///
/// All HTTP tries of one delivery share this row; `tries` counts them.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    /// Unique attempt id.
    pub id: AttemptId,
    /// Subscription the attempt delivers to.
    pub webhook_id: SubscriptionId,
    /// Event name.
    pub event: String,
    /// Event payload, replayed verbatim on reprocessing.
    pub payload: EventPayload,
    /// Current status.
    pub status: AttemptStatus,
    /// Last HTTP status code received, if any.
    pub status_code: Option<u16>,
    /// Last (truncated) response body, if any.
    pub response: Option<String>,
    /// Last error message, if any.
    pub error: Option<String>,
    /// Number of HTTP calls made so far.
    pub tries: u32,
    /// Time the attempt row was created.
    pub attempted_at: DateTime<Utc>,
}

/// Interim or terminal state written to an attempt row after an HTTP try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptUpdate {
    /// New status.
    pub status: AttemptStatus,
    /// HTTP status code, if one was received.
    pub status_code: Option<u16>,
    /// Response body, if one was received.
    pub response: Option<String>,
    /// Error message for failures.
    pub error: Option<String>,
    /// HTTP calls made so far.
    pub tries: u32,
}

/// A failed attempt joined with its (current) owning subscription.
#[derive(Debug, Clone)]
pub struct AttemptWithSubscription {
    /// The failed attempt.
    pub attempt: DeliveryAttempt,
    /// Its subscription as it is now, not as it was at delivery time.
    pub subscription: Subscription,
}

/// Attempt counts for one subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptStats {
    /// Total attempt rows.
    pub total: usize,
    /// Rows with status `success`.
    pub success: usize,
    /// Rows with status `failed`.
    pub failed: usize,
    /// Rows still `pending`.
    pub pending: usize,
}

impl AttemptStats {
    /// Share of terminal attempts that succeeded, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        let terminal = self.success + self.failed;
        if terminal == 0 {
            return 0.0;
        }
        (self.success as f64 / terminal as f64) * 100.0
    }
}
