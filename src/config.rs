//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the odds API key) are referenced by env-var name in the config
//! and resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::storage::DEFAULT_STORE_FILE;
use crate::types::{parse_timezone, DEFAULT_TIMEZONE};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub desk: DeskConfig,
    pub odds: OddsConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeskConfig {
    pub name: String,
    /// Play money credited to every new account.
    pub starting_wallet: Decimal,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// Account store file. Empty keeps accounts in memory only.
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
    /// Account to log in at startup, if any.
    #[serde(default)]
    pub default_user: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OddsConfig {
    pub base_url: String,
    pub sport: String,
    pub regions: String,
    pub markets: String,
    pub odds_format: String,
    pub api_key_env: String,
    pub refresh_interval_secs: u64,
    pub timeout_secs: u64,
    /// Saved API payload used when no API key is available.
    #[serde(default)]
    pub fallback_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_store_path() -> String {
    DEFAULT_STORE_FILE.to_string()
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("oddsdesk_settings.json")
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to load config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the rest of the crate assumes are sane.
    pub fn validate(&self) -> Result<()> {
        if self.desk.starting_wallet < Decimal::ZERO {
            bail!("desk.starting_wallet must not be negative");
        }
        parse_timezone(&self.desk.default_timezone)
            .context("desk.default_timezone is not an IANA timezone")?;
        if self.odds.refresh_interval_secs == 0 {
            bail!("odds.refresh_interval_secs must be greater than zero");
        }
        if self.odds.timeout_secs == 0 {
            bail!("odds.timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
