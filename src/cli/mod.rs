//! CLI command implementations.
//!
//! Each function backs one `shopbell` subcommand. Output goes to stdout;
//! logs go to stderr through `tracing`.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trigger` | Dispatch an event to a tenant's subscriptions |
//! | `reprocess` | Replay a tenant's failed deliveries |
//! | `test` | Send a test event to one subscription |
//! | `history` | Show recent attempts of a subscription |
//! | `stats` | Show attempt counts of a subscription |
//! | `subscriptions` | List, add, enable and disable subscriptions |

pub mod subscriptions;
pub mod webhook;

use crate::{Error, Result};
use serde::Serialize;

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned text table.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
    /// YAML.
    Yaml,
}

/// Serializes `value` as JSON or YAML.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if serialization fails or `format` is
/// [`OutputFormat::Table`].
pub fn to_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| Error::operation("serialize_json_output", e)),
        OutputFormat::Yaml => serde_yaml_ng::to_string(value)
            .map_err(|e| Error::operation("serialize_yaml_output", e)),
        OutputFormat::Table => Err(Error::operation(
            "serialize_output",
            "table output is not structured",
        )),
    }
}

/// Truncates a string to `max_len` characters, adding `...` when cut.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
