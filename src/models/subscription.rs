//! Webhook subscriptions.

use super::ids::{SubscriptionId, TenantId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

/// A tenant's registration of interest in business events.
///
/// The delivery engine treats `url`, `secret` and `events` as opaque inputs
/// and never changes them; the only field it writes is `last_triggered_at`.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    /// Unique subscription id.
    pub id: SubscriptionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// HTTP(S) endpoint that receives deliveries.
    pub url: String,
    /// Shared signing key. Serialized as a placeholder, never in cleartext.
    #[serde(serialize_with = "serialize_redacted")]
    pub secret: SecretString,
    /// Event names this subscription wants.
    pub events: BTreeSet<String>,
    /// Inactive subscriptions are never delivered to.
    pub is_active: bool,
    /// Time of the last successful delivery.
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Time the subscription was registered.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Checks whether this subscription should receive `event` for `tenant_id`.
    #[must_use]
    pub fn matches(&self, tenant_id: &TenantId, event: &str) -> bool {
        self.is_active && &self.tenant_id == tenant_id && self.events.contains(event)
    }
}

/// Input for registering a subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// HTTP(S) endpoint.
    pub url: String,
    /// Shared signing key.
    pub secret: SecretString,
    /// Event names to subscribe to.
    pub events: Vec<String>,
}

impl NewSubscription {
    /// Creates a registration request.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<TenantId>,
        url: impl Into<String>,
        secret: impl Into<String>,
        events: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            url: url.into(),
            secret: SecretString::from(secret.into()),
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if:
    /// - The URL does not parse, is not `http` or `https`, or has no host
    /// - The secret is empty
    /// - No event names are given, or one of them is blank
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.url).map_err(|e| {
            Error::InvalidInput(format!("Invalid webhook URL '{}': {e}", self.url))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Webhook URL must use http or https: {}",
                self.url
            )));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::InvalidInput(format!(
                "Webhook URL must have a host: {}",
                self.url
            )));
        }

        if self.secret.expose_secret().is_empty() {
            return Err(Error::InvalidInput(
                "Webhook secret cannot be empty".to_string(),
            ));
        }

        if self.events.is_empty() || self.events.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::InvalidInput(
                "Webhook must subscribe to at least one named event".to_string(),
            ));
        }

        Ok(())
    }
}

fn serialize_redacted<S>(
    _secret: &SecretString,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str("***REDACTED***")
}
