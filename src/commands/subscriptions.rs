//! Subscription CLI command handler.

use super::SubscriptionAction;
use shopbell::SubscriptionId;
use shopbell::cli::subscriptions::{
    cmd_subscriptions_add, cmd_subscriptions_list, cmd_subscriptions_set_active,
};
use shopbell::models::{NewSubscription, TenantId};
use shopbell::webhooks::WebhookService;

/// Handles subscription subcommands.
///
/// # Errors
///
/// Returns an error if the subcommand fails.
pub fn cmd_subscriptions(
    service: &WebhookService,
    action: SubscriptionAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SubscriptionAction::List { tenant, format } => {
            cmd_subscriptions_list(service, &TenantId::new(tenant), format)?;
        },
        SubscriptionAction::Add {
            tenant,
            url,
            secret,
            events,
        } => {
            cmd_subscriptions_add(service, NewSubscription::new(tenant, url, secret, events))?;
        },
        SubscriptionAction::Disable { webhook_id } => {
            cmd_subscriptions_set_active(service, &SubscriptionId::new(webhook_id), false)?;
        },
        SubscriptionAction::Enable { webhook_id } => {
            cmd_subscriptions_set_active(service, &SubscriptionId::new(webhook_id), true)?;
        },
    }

    Ok(())
}
