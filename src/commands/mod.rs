//! Command handlers module.
//!
//! Subcommand enums that need their own handler live here; the command
//! bodies themselves are in `shopbell::cli`.

mod subscriptions;

use clap::Subcommand;
use shopbell::cli::OutputFormat;

pub use subscriptions::cmd_subscriptions;

/// Subscription subcommands.
#[derive(Subcommand)]
pub enum SubscriptionAction {
    /// List the subscriptions of a tenant.
    List {
        /// Tenant id.
        #[arg(short, long)]
        tenant: String,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Register a subscription.
    Add {
        /// Tenant id.
        #[arg(short, long)]
        tenant: String,

        /// Endpoint URL (http or https).
        #[arg(short, long)]
        url: String,

        /// Shared signing secret.
        #[arg(short, long, env = "SHOPBELL_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,

        /// Event names (comma-separated).
        #[arg(short, long, value_delimiter = ',', required = true)]
        events: Vec<String>,
    },

    /// Disable a subscription.
    Disable {
        /// Subscription id.
        webhook_id: String,
    },

    /// Enable a subscription.
    Enable {
        /// Subscription id.
        webhook_id: String,
    },
}
