//! Engine configuration loading from config.toml
//!
//! Everything here has a sensible default, so a missing config file is not an error;
//! a config file that exists but cannot be parsed or fails validation is.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::{path::Path, time::Duration};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Cron expression (with seconds) for the daily run
    pub daily_schedule: String,
    /// Day of month the monthly batch reminder goes out
    pub monthly_reminder_day: u32,
    /// Upper bound on the time spent processing a single tenant
    pub tenant_timeout_secs: u64,
    /// Sender identity for reminder emails
    pub email: EmailConfig,
}

/// Sender identity used for outgoing reminder emails
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EmailConfig {
    /// From email address
    pub from_address: String,
    /// From name
    pub from_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            daily_schedule: "0 0 6 * * *".to_string(),
            monthly_reminder_day: 25,
            tenant_timeout_secs: 300,
            email: EmailConfig::default(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_address: "renewals@localhost".to_string(),
            from_name: "Renewal Reminders".to_string(),
        }
    }
}

impl EmailConfig {
    /// Get formatted "From" header value
    #[must_use]
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_address)
    }
}

impl EngineConfig {
    /// Per-tenant timeout as a `Duration`.
    #[must_use]
    pub const fn tenant_timeout(&self) -> Duration {
        Duration::from_secs(self.tenant_timeout_secs)
    }

    /// Checks values that would make the engine misbehave silently.
    pub fn validate(&self) -> Result<()> {
        // Day 29-31 does not exist in every month, so the batch would be skipped.
        if !(1..=28).contains(&self.monthly_reminder_day) {
            return Err(Error::Config {
                message: format!(
                    "monthly_reminder_day must be between 1 and 28, got {}",
                    self.monthly_reminder_day
                ),
            });
        }
        if self.tenant_timeout_secs == 0 {
            return Err(Error::Config {
                message: "tenant_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.daily_schedule.trim().is_empty() {
            return Err(Error::Config {
                message: "daily_schedule cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads and validates engine configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A value fails [`EngineConfig::validate`]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    let config: EngineConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from `ENGINE_CONFIG` (default `./config.toml`), falling back to
/// defaults when the file does not exist.
pub fn load_default_config() -> Result<EngineConfig> {
    let path = std::env::var("ENGINE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        tracing::info!(path = %path, "Loading engine configuration");
        load_config(&path)
    } else {
        tracing::info!(path = %path, "No engine configuration file found, using defaults");
        Ok(EngineConfig::default())
    }
}
