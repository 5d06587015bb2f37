//! Subscription management commands.
//!
//! Subscriptions are normally managed by the shop application. These
//! commands let operators inspect and adjust them locally.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{OutputFormat, to_structured, truncate};
use crate::Result;
use crate::models::{NewSubscription, Subscription, SubscriptionId, TenantId};
use crate::webhooks::WebhookService;
use std::fmt::Write as _;

/// Lists the subscriptions of a tenant. Secrets are never printed.
///
/// # Errors
///
/// Returns an error if the subscription store cannot be read.
pub fn cmd_subscriptions_list(
    service: &WebhookService,
    tenant_id: &TenantId,
    format: OutputFormat,
) -> Result<()> {
    let subscriptions = service.subscriptions().list_subscriptions(tenant_id)?;

    if subscriptions.is_empty() {
        println!("No webhook subscriptions for '{tenant_id}'.");
        return Ok(());
    }

    if format == OutputFormat::Table {
        print!("{}", render_subscriptions(&subscriptions));
    } else {
        println!("{}", to_structured(&subscriptions, format)?);
    }

    Ok(())
}

/// Registers a subscription and prints its id.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] if the registration is invalid.
pub fn cmd_subscriptions_add(service: &WebhookService, new: NewSubscription) -> Result<()> {
    let subscription = service.subscriptions().insert_subscription(new)?;
    println!("Created webhook subscription {}", subscription.id);
    Ok(())
}

/// Enables or disables a subscription.
///
/// # Errors
///
/// Returns [`crate::Error::NotFound`] if the subscription does not exist.
pub fn cmd_subscriptions_set_active(
    service: &WebhookService,
    webhook_id: &SubscriptionId,
    active: bool,
) -> Result<()> {
    service.subscriptions().set_active(webhook_id, active)?;
    println!(
        "Webhook subscription {webhook_id} {}",
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Renders subscriptions as a table.
#[must_use]
pub fn render_subscriptions(subscriptions: &[Subscription]) -> String {
    let mut out = String::new();
    let rule = "-".repeat(110);

    let _ = writeln!(out, "Webhook Subscriptions:");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<38} {:<8} {:<35} {:<26}",
        "ID", "ACTIVE", "URL", "EVENTS"
    );
    let _ = writeln!(out, "{rule}");

    for subscription in subscriptions {
        let events = subscription
            .events
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        let _ = writeln!(
            out,
            "{:<38} {:<8} {:<35} {:<26}",
            subscription.id,
            if subscription.is_active { "Yes" } else { "No" },
            truncate(&subscription.url, 35),
            truncate(&events, 26),
        );
    }

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Total: {} subscription(s)", subscriptions.len());
    out
}
