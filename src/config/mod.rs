//! Configuration management.
//!
//! Configuration is read from a TOML file and then overridden by
//! `SHOPBELL_*` environment variables:
//!
//! ```toml
//! data_dir = "/var/lib/shopbell"
//!
//! [delivery]
//! max_retries = 3
//! base_delay_ms = 1000
//! timeout_secs = 10
//! response_body_limit = 1024
//!
//! [logging]
//! format = "json"
//! level = "info"
//! file = "/var/log/shopbell.log"
//! ```

use crate::webhooks::RetryPolicy;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SHOPBELL_CONFIG_PATH";

/// Main configuration for shopbell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopbellConfig {
    /// Directory holding `webhooks.db`.
    pub data_dir: PathBuf,
    /// Delivery and retry settings.
    pub delivery: DeliverySettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Delivery and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    /// HTTP tries per delivery.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Stored response body limit in bytes.
    pub response_body_limit: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_retries: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: RetryPolicy::DEFAULT_BASE_DELAY_MS,
            timeout_secs: RetryPolicy::DEFAULT_TIMEOUT_SECS,
            response_body_limit: RetryPolicy::DEFAULT_RESPONSE_BODY_LIMIT,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: String,
    /// `EnvFilter` directive.
    pub level: String,
    /// Optional log file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Delivery section.
    pub delivery: Option<ConfigFileDelivery>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Delivery section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileDelivery {
    /// Tries per delivery.
    pub max_retries: Option<u32>,
    /// Base delay in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Response body limit in bytes.
    pub response_body_limit: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// Line format.
    pub format: Option<String>,
    /// Filter directive.
    pub level: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl Default for ShopbellConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            delivery: DeliverySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ShopbellConfig {
    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration TOML.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/shopbell/` on macOS)
    /// 2. XDG config dir (`~/.config/shopbell/`)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs.config_dir().join("shopbell").join("config.toml");
        if platform_config.exists() {
            match Self::load_from_file(&platform_config) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(
                    path = %platform_config.display(),
                    error = %e,
                    "Ignoring unreadable config file"
                ),
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("shopbell")
            .join("config.toml");
        if xdg_config.exists() {
            match Self::load_from_file(&xdg_config) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(
                    path = %xdg_config.display(),
                    error = %e,
                    "Ignoring unreadable config file"
                ),
            }
        }

        Self::default()
    }

    /// Resolves the full configuration.
    ///
    /// An explicit path wins, then `SHOPBELL_CONFIG_PATH`, then the default
    /// locations. Environment overrides are applied last and the result is
    /// validated.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be loaded, an
    /// override is malformed, or the result is invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Converts a `ConfigFile` to `ShopbellConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(delivery) = file.delivery {
            if let Some(v) = delivery.max_retries {
                config.delivery.max_retries = v;
            }
            if let Some(v) = delivery.base_delay_ms {
                config.delivery.base_delay_ms = v;
            }
            if let Some(v) = delivery.timeout_secs {
                config.delivery.timeout_secs = v;
            }
            if let Some(v) = delivery.response_body_limit {
                config.delivery.response_body_limit = v;
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = format;
            }
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }

        config
    }

    /// Applies `SHOPBELL_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a numeric override does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SHOPBELL_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SHOPBELL_MAX_RETRIES") {
            self.delivery.max_retries = parse_override("SHOPBELL_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("SHOPBELL_BASE_DELAY_MS") {
            self.delivery.base_delay_ms = parse_override("SHOPBELL_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("SHOPBELL_TIMEOUT_SECS") {
            self.delivery.timeout_secs = parse_override("SHOPBELL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("SHOPBELL_LOG_FORMAT") {
            self.logging.format = v;
        }
        if let Some(v) = lookup("SHOPBELL_LOG") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `max_retries` or `timeout_secs` is zero.
    pub fn validate(&self) -> Result<()> {
        self.retry_policy().validate()
    }

    /// Returns the retry policy described by the delivery settings.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.delivery.max_retries,
            base_delay: Duration::from_millis(self.delivery.base_delay_ms),
            timeout: Duration::from_secs(self.delivery.timeout_secs),
            response_body_limit: self.delivery.response_body_limit,
        }
    }

    /// Returns the webhook database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("webhooks.db")
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".shopbell"),
        |dirs| dirs.data_local_dir().join("shopbell"),
    )
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{key} has an invalid value: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ShopbellConfig::default();
        assert_eq!(config.delivery, DeliverySettings::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.database_path().ends_with("webhooks.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_file() {
        let config = ShopbellConfig::from_toml_str(
            r#"
            data_dir = "/srv/shopbell"

            [delivery]
            max_retries = 5
            base_delay_ms = 250
            timeout_secs = 3
            response_body_limit = 64

            [logging]
            format = "json"
            level = "debug"
            file = "/var/log/shopbell.log"
            "#,
        )
        .expect("parse");

        assert_eq!(config.data_dir, PathBuf::from("/srv/shopbell"));
        assert_eq!(config.database_path(), PathBuf::from("/srv/shopbell/webhooks.db"));
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.timeout, Duration::from_secs(3));
        assert_eq!(policy.response_body_limit, 64);
        assert_eq!(config.logging.format, "json");
        assert_eq!(
            config.logging.file,
            Some(PathBuf::from("/var/log/shopbell.log"))
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ShopbellConfig::from_toml_str("[delivery]\nmax_retries = 1\n").expect("parse");
        assert_eq!(config.delivery.max_retries, 1);
        assert_eq!(config.delivery.base_delay_ms, 1000);
        assert_eq!(config.logging, LoggingSettings::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(ShopbellConfig::from_toml_str("[delivery]\nretries = 2\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "data_dir = \"/tmp/bell\"\n").expect("write");

        let config = ShopbellConfig::load_from_file(&path).expect("load");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/bell"));

        assert!(ShopbellConfig::load_from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SHOPBELL_DATA_DIR", "/data"),
            ("SHOPBELL_MAX_RETRIES", "7"),
            ("SHOPBELL_BASE_DELAY_MS", "20"),
            ("SHOPBELL_TIMEOUT_SECS", "2"),
            ("SHOPBELL_LOG_FORMAT", "json"),
            ("SHOPBELL_LOG", "warn"),
        ]
        .into_iter()
        .collect();

        let mut config = ShopbellConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| (*v).to_string()))
            .expect("overrides");

        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.delivery.max_retries, 7);
        assert_eq!(config.delivery.base_delay_ms, 20);
        assert_eq!(config.delivery.timeout_secs, 2);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_malformed_override_rejected() {
        let mut config = ShopbellConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "SHOPBELL_MAX_RETRIES").then(|| "three".to_string())
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_zero_values_invalid() {
        let mut config = ShopbellConfig::default();
        config.delivery.max_retries = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));

        let mut config = ShopbellConfig::default();
        config.delivery.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
