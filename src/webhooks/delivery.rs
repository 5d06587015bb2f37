//! Single HTTP delivery try.
//!
//! The executor builds the signed JSON envelope for one event and POSTs it
//! once to a subscription URL. It never retries; that is the job of the
//! [`RetryScheduler`](super::retry::RetryScheduler).
//!
//! # Request
//!
//! ```text
//! POST <subscription.url>
//! Content-Type: application/json
//! User-Agent: shopbell/<version>
//! X-Webhook-Signature: <hex HMAC-SHA256 of body>
//! X-Webhook-Event: <event name>
//!
//! {"event":"<event name>","payload":<payload>,"timestamp":"<ISO-8601>"}
//! ```

use super::signature::{SIGNATURE_HEADER, sign};
use crate::models::{EventPayload, Subscription};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::value::RawValue;
use std::time::Duration;

/// Header carrying the event name.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Suffix appended to response bodies cut at the size limit.
pub const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Result of one HTTP try.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The endpoint answered with a 2xx status.
    Success {
        /// HTTP status code.
        status_code: u16,
        /// Response body, truncated.
        body: String,
    },
    /// The endpoint answered with a non-2xx status.
    HttpFailure {
        /// HTTP status code.
        status_code: u16,
        /// Response body, truncated.
        body: String,
    },
    /// No HTTP response was received.
    NetworkFailure {
        /// What went wrong (timeout, refused connection, DNS, request build).
        message: String,
    },
}

impl DeliveryOutcome {
    /// Returns `true` for [`DeliveryOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the HTTP status code, if a response was received.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success { status_code, .. } | Self::HttpFailure { status_code, .. } => {
                Some(*status_code)
            },
            Self::NetworkFailure { .. } => None,
        }
    }

    /// Returns the response body, if a response was received.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Success { body, .. } | Self::HttpFailure { body, .. } => Some(body),
            Self::NetworkFailure { .. } => None,
        }
    }

    /// Returns the error message recorded for a failed try.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::HttpFailure { status_code, .. } => Some(format!("HTTP {status_code} response")),
            Self::NetworkFailure { message } => Some(message.clone()),
        }
    }

    /// Returns the metrics label for this outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::HttpFailure { .. } => "http_failure",
            Self::NetworkFailure { .. } => "network_failure",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    payload: &'a RawValue,
    timestamp: String,
}

/// Builds the JSON request body for an event.
///
/// The payload is embedded verbatim; the timestamp is RFC 3339 UTC with
/// millisecond precision.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the envelope cannot be serialized.
pub fn build_body(event: &str, payload: &EventPayload, timestamp: DateTime<Utc>) -> Result<String> {
    let envelope = Envelope {
        event,
        payload: payload.as_raw(),
        timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    serde_json::to_string(&envelope).map_err(|e| Error::operation("serialize_webhook_body", e))
}

/// Truncates `body` to at most `limit` bytes on a char boundary, appending
/// [`TRUNCATION_SUFFIX`] when anything was cut.
#[must_use]
pub fn truncate_body(mut body: String, limit: usize) -> String {
    if body.len() <= limit {
        return body;
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    body.push_str(TRUNCATION_SUFFIX);
    body
}

/// Performs exactly one signed HTTP POST per call.
#[derive(Debug, Clone)]
pub struct DeliveryAttemptExecutor {
    client: reqwest::Client,
    timeout: Duration,
    response_body_limit: usize,
}

impl DeliveryAttemptExecutor {
    /// Creates an executor with a per-request timeout and response body limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration, response_body_limit: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("shopbell/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::operation("build_http_client", e))?;

        Ok(Self {
            client,
            timeout,
            response_body_limit,
        })
    }

    /// Delivers `event` with `payload` to `subscription` once.
    pub async fn attempt(
        &self,
        subscription: &Subscription,
        event: &str,
        payload: &EventPayload,
    ) -> DeliveryOutcome {
        let body = match build_body(event, payload, Utc::now()) {
            Ok(body) => body,
            Err(e) => {
                return DeliveryOutcome::NetworkFailure {
                    message: format!("failed to build request: {e}"),
                };
            },
        };
        let signature = sign(subscription.secret.expose_secret(), body.as_bytes());

        let request = self
            .client
            .post(&subscription.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event)
            .body(body);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return self.network_failure(&e),
        };

        let status = response.status();
        let status_code = status.as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    webhook_id = %subscription.id,
                    status_code = status_code,
                    error = %e,
                    "Failed to read webhook response body"
                );
                format!("[Failed to read response body: {e}]")
            },
        };
        let body = truncate_body(text, self.response_body_limit);

        if status.is_success() {
            DeliveryOutcome::Success { status_code, body }
        } else {
            DeliveryOutcome::HttpFailure { status_code, body }
        }
    }

    fn network_failure(&self, err: &reqwest::Error) -> DeliveryOutcome {
        let message = if err.is_timeout() {
            format!("request timed out after {}ms", self.timeout.as_millis())
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else if err.is_builder() {
            format!("failed to build request: {err}")
        } else {
            format!("HTTP request failed: {err}")
        };
        DeliveryOutcome::NetworkFailure { message }
    }
}
