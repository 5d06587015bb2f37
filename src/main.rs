//! Binary entry point for shopbell.
//!
//! This binary provides the operator CLI for the webhook delivery engine.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use commands::{SubscriptionAction, cmd_subscriptions};
use shopbell::cli::OutputFormat;
use shopbell::cli::webhook::{
    cmd_history, cmd_reprocess, cmd_stats, cmd_test, cmd_trigger, read_payload,
};
use shopbell::config::ShopbellConfig;
use shopbell::observability::{self, LoggingConfig};
use shopbell::webhooks::WebhookService;
use shopbell::{SubscriptionId, TenantId};
use std::path::PathBuf;
use std::process::ExitCode;

/// Shopbell - outbound webhook delivery for a multi-tenant shop system.
#[derive(Parser)]
#[command(name = "shopbell")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Dispatch an event to every matching subscription of a tenant.
    Trigger {
        /// Tenant the event belongs to.
        #[arg(short, long)]
        tenant: String,

        /// Event name, such as `quote.approved`.
        #[arg(short, long)]
        event: String,

        /// Inline JSON payload.
        #[arg(short, long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// File containing the JSON payload.
        #[arg(long)]
        payload_file: Option<PathBuf>,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Replay a tenant's most recent failed deliveries.
    Reprocess {
        /// Tenant whose failed deliveries are replayed.
        #[arg(short, long)]
        tenant: String,

        /// Maximum number of failed attempts to replay.
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Send a test event to one subscription.
    Test {
        /// Subscription id.
        webhook_id: String,
    },

    /// Show recent delivery attempts of a subscription.
    History {
        /// Subscription id.
        webhook_id: String,

        /// Maximum number of attempts to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show delivery statistics of a subscription.
    Stats {
        /// Subscription id.
        webhook_id: String,
    },

    /// Manage webhook subscriptions.
    Subscriptions {
        #[command(subcommand)]
        action: SubscriptionAction,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match ShopbellConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(LoggingConfig::from_settings(&config.logging, cli.verbose))
    {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(
    command: Commands,
    config: &ShopbellConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = WebhookService::from_config(config)?;

    match command {
        Commands::Trigger {
            tenant,
            event,
            payload,
            payload_file,
            format,
        } => {
            let payload = read_payload(payload.as_deref(), payload_file.as_deref())?;
            cmd_trigger(&service, &TenantId::new(tenant), &event, &payload, format).await?;
        },
        Commands::Reprocess {
            tenant,
            limit,
            format,
        } => {
            cmd_reprocess(&service, &TenantId::new(tenant), limit, format).await?;
        },
        Commands::Test { webhook_id } => {
            cmd_test(&service, &SubscriptionId::new(webhook_id)).await?;
        },
        Commands::History {
            webhook_id,
            limit,
            format,
        } => {
            cmd_history(&service, &SubscriptionId::new(webhook_id), limit, format)?;
        },
        Commands::Stats { webhook_id } => {
            cmd_stats(&service, &SubscriptionId::new(webhook_id))?;
        },
        Commands::Subscriptions { action } => {
            cmd_subscriptions(&service, action)?;
        },
    }

    Ok(())
}
