//! Failure classification.
//!
//! Decides whether a failed HTTP try is worth repeating. Rules, in order:
//!
//! | Outcome | Retryable |
//! |---------|-----------|
//! | No HTTP status (timeout, refused, DNS) | yes |
//! | 500-599 | yes |
//! | 429 Too Many Requests | yes |
//! | 408 Request Timeout | yes |
//! | Any other status | no |

use super::delivery::DeliveryOutcome;

/// Kind of a failed delivery try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Worth retrying.
    Transient,
    /// Retrying will not help.
    Permanent,
}

impl FailureKind {
    /// Returns the label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

/// Returns `true` if an HTTP status code indicates a transient failure.
#[must_use]
pub const fn is_retryable_status(status_code: u16) -> bool {
    matches!(status_code, 500..=599 | 429 | 408)
}

/// Returns `true` if a failed outcome should be retried.
///
/// Successful outcomes are never retryable.
#[must_use]
pub const fn is_retryable(outcome: &DeliveryOutcome) -> bool {
    match outcome {
        DeliveryOutcome::Success { .. } => false,
        DeliveryOutcome::HttpFailure { status_code, .. } => is_retryable_status(*status_code),
        DeliveryOutcome::NetworkFailure { .. } => true,
    }
}

/// Classifies an outcome, or `None` for a success.
#[must_use]
pub const fn classify(outcome: &DeliveryOutcome) -> Option<FailureKind> {
    if outcome.is_success() {
        None
    } else if is_retryable(outcome) {
        Some(FailureKind::Transient)
    } else {
        Some(FailureKind::Permanent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn http(status_code: u16) -> DeliveryOutcome {
        DeliveryOutcome::HttpFailure {
            status_code,
            body: String::new(),
        }
    }

    #[test]
    fn test_network_failure_is_retryable() {
        let outcome = DeliveryOutcome::NetworkFailure {
            message: "connection refused".to_string(),
        };
        assert!(is_retryable(&outcome));
        assert_eq!(classify(&outcome), Some(FailureKind::Transient));
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [500, 502, 503, 504, 599, 429, 408] {
            assert!(is_retryable(&http(code)), "{code} should be retryable");
        }
    }

    #[test]
    fn test_permanent_statuses() {
        for code in [400, 401, 403, 404, 409, 410, 422, 301, 600] {
            assert!(!is_retryable(&http(code)), "{code} should not be retryable");
            assert_eq!(classify(&http(code)), Some(FailureKind::Permanent));
        }
    }

    #[test]
    fn test_success_is_not_classified() {
        let outcome = DeliveryOutcome::Success {
            status_code: 200,
            body: "ok".to_string(),
        };
        assert!(!is_retryable(&outcome));
        assert_eq!(classify(&outcome), None);
    }

    proptest! {
        #[test]
        fn prop_classification_matches_rules(code in 100u16..1000) {
            let expected = (500..=599).contains(&code) || code == 429 || code == 408;
            prop_assert_eq!(is_retryable(&http(code)), expected);
        }
    }
}
