//! Webhook delivery CLI commands.
//!
//! Provides commands for operating the delivery engine:
//! - Trigger an event for a tenant
//! - Reprocess failed deliveries
//! - Test a subscription
//! - View attempt history and statistics

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{OutputFormat, to_structured, truncate};
use crate::models::{
    AttemptStats, AttemptStatus, DeliveryAttempt, EventPayload, SubscriptionId, TenantId,
};
use crate::webhooks::{DeliveryResult, WebhookService};
use crate::{Error, Result};
use std::fmt::Write as _;
use std::path::Path;

/// Resolves the event payload from inline JSON or a file.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if neither or both sources are given or
/// the JSON is invalid, and [`Error::OperationFailed`] if the file cannot be read.
pub fn read_payload(inline: Option<&str>, file: Option<&Path>) -> Result<EventPayload> {
    match (inline, file) {
        (Some(json), None) => EventPayload::from_json_str(json.trim()),
        (None, Some(path)) => {
            let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
                operation: "read_payload_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;
            EventPayload::from_json_str(contents.trim())
        },
        (None, None) => Err(Error::InvalidInput(
            "either --payload or --payload-file is required".to_string(),
        )),
        (Some(_), Some(_)) => Err(Error::InvalidInput(
            "--payload and --payload-file are mutually exclusive".to_string(),
        )),
    }
}

/// Dispatches an event to every matching subscription of a tenant.
///
/// # Errors
///
/// Returns an error if the summary cannot be serialized.
pub async fn cmd_trigger(
    service: &WebhookService,
    tenant_id: &TenantId,
    event: &str,
    payload: &EventPayload,
    format: OutputFormat,
) -> Result<()> {
    let summary = service.dispatch(tenant_id, event, payload).await;

    if format == OutputFormat::Table {
        if summary.matched == 0 {
            println!("No active subscriptions of '{tenant_id}' listen to '{event}'.");
        } else {
            println!("Dispatched '{event}' for tenant '{tenant_id}':");
            println!("  Matched:   {}", summary.matched);
            println!("  Delivered: {}", summary.delivered);
            println!("  Failed:    {}", summary.failed);
        }
    } else {
        println!("{}", to_structured(&summary, format)?);
    }

    Ok(())
}

/// Replays failed deliveries of a tenant.
///
/// # Errors
///
/// Returns an error if the failed attempts cannot be loaded.
pub async fn cmd_reprocess(
    service: &WebhookService,
    tenant_id: &TenantId,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let summary = service.reprocess(tenant_id, limit).await?;

    if format == OutputFormat::Table {
        if summary.retried == 0 {
            println!("No failed deliveries to reprocess for '{tenant_id}'.");
        } else {
            println!("Reprocessed failed deliveries for '{tenant_id}':");
            println!("  Retried:   {}", summary.retried);
            println!("  Succeeded: {}", summary.succeeded);
            println!("  Failed:    {}", summary.failed);
        }
    } else {
        println!("{}", to_structured(&summary, format)?);
    }

    Ok(())
}

/// Sends a test event to one subscription.
///
/// # Errors
///
/// Returns an error if the subscription does not exist or the attempt
/// cannot be recorded. A failed delivery is reported, not returned.
pub async fn cmd_test(service: &WebhookService, webhook_id: &SubscriptionId) -> Result<()> {
    println!("Testing webhook '{webhook_id}'...");

    match service.test_subscription(webhook_id).await? {
        DeliveryResult::Delivered(success) => {
            println!("✓ Webhook test successful!");
            println!("  Status code: {}", success.status_code);
            println!("  Tries: {}", success.tries);
            println!("  Attempt: {}", success.attempt_id);
        },
        DeliveryResult::Failed(failure) => {
            println!("✗ Webhook test failed!");
            if let Some(code) = failure.status_code {
                println!("  Status code: {code}");
            }
            println!("  Tries: {}", failure.tries);
            println!("  Attempt: {}", failure.attempt_id);
            println!("  Error: {}", failure.error);
        },
    }

    Ok(())
}

/// Shows the most recent attempts of a subscription.
///
/// # Errors
///
/// Returns an error if the attempt store cannot be read.
pub fn cmd_history(
    service: &WebhookService,
    webhook_id: &SubscriptionId,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let attempts = service.attempts().attempt_history(webhook_id, limit)?;

    if attempts.is_empty() {
        println!("No delivery history found for '{webhook_id}'.");
        return Ok(());
    }

    if format == OutputFormat::Table {
        print!("{}", render_history(&attempts));
    } else {
        println!("{}", to_structured(&attempts, format)?);
    }

    Ok(())
}

/// Shows attempt counts of a subscription.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the subscription does not exist.
pub fn cmd_stats(service: &WebhookService, webhook_id: &SubscriptionId) -> Result<()> {
    if service.subscriptions().get_subscription(webhook_id)?.is_none() {
        return Err(Error::NotFound(format!("webhook subscription {webhook_id}")));
    }

    let stats = service.attempts().attempt_stats(webhook_id)?;
    print!("{}", render_stats(webhook_id, &stats));
    Ok(())
}

/// Renders attempts as a table.
#[must_use]
pub fn render_history(attempts: &[DeliveryAttempt]) -> String {
    let mut out = String::new();
    let rule = "-".repeat(100);

    let _ = writeln!(out, "Webhook Delivery History:");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<38} {:<20} {:<10} {:<6} {:<6} {:<20}",
        "ATTEMPT", "EVENT", "STATUS", "CODE", "TRIES", "ATTEMPTED"
    );
    let _ = writeln!(out, "{rule}");

    for attempt in attempts {
        let status = match attempt.status {
            AttemptStatus::Success => "✓ OK",
            AttemptStatus::Failed => "✗ FAIL",
            AttemptStatus::Pending => "… PEND",
        };
        let code = attempt
            .status_code
            .map_or_else(|| "-".to_string(), |c| c.to_string());

        let _ = writeln!(
            out,
            "{:<38} {:<20} {:<10} {:<6} {:<6} {:<20}",
            attempt.id,
            truncate(&attempt.event, 20),
            status,
            code,
            attempt.tries,
            attempt.attempted_at.format("%Y-%m-%d %H:%M:%S"),
        );
        if let Some(error) = &attempt.error {
            let _ = writeln!(out, "    error: {}", truncate(error, 90));
        }
    }

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Showing {} record(s)", attempts.len());
    out
}

/// Renders attempt counts.
#[must_use]
pub fn render_stats(webhook_id: &SubscriptionId, stats: &AttemptStats) -> String {
    let mut out = String::new();
    let rule = "-".repeat(80);

    let _ = writeln!(out, "Webhook Statistics:");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<38} {:<8} {:<8} {:<8} {:<8} {:<10}",
        "WEBHOOK", "TOTAL", "SUCCESS", "FAILED", "PENDING", "SUCCESS %"
    );
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<38} {:<8} {:<8} {:<8} {:<8} {:<9.1}%",
        truncate(webhook_id.as_str(), 38),
        stats.total,
        stats.success,
        stats.failed,
        stats.pending,
        stats.success_rate(),
    );
    let _ = writeln!(out, "{rule}");
    out
}
