//! Configuration management
//!
//! Settings live in `ledger.json` inside the ledger directory:
//! ```json
//! {
//!   "database": "ledger.duckdb",
//!   "poolSize": 4,
//!   "transfer": { "maxAttempts": 5, "timeoutMs": 5000 },
//!   "logging": { "level": "info", "json": false }
//! }
//! ```
//! Every key is optional. Keys this crate does not manage survive `save`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::duckdb::DEFAULT_POOL_SIZE;
use crate::services::transfer::{TransferPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT};

pub const SETTINGS_FILE: &str = "ledger.json";
pub const DEFAULT_DATABASE: &str = "ledger.duckdb";

/// Raw ledger.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pool_size: Option<usize>,
    #[serde(default)]
    transfer: TransferSettings,
    #[serde(default)]
    logging: LoggingSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoggingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    json: Option<bool>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Ledger configuration (resolved view of settings plus environment)
#[derive(Debug, Clone)]
pub struct Config {
    /// Database file name, relative to the ledger directory unless absolute
    pub database: String,
    pub pool_size: usize,
    pub max_attempts: u32,
    /// Transfer timeout in milliseconds, 0 disables
    pub timeout_ms: u64,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load config from the ledger directory, applying `LEDGER_*` overrides
    pub fn load(ledger_dir: &Path) -> Result<Self> {
        Self::load_with_env(ledger_dir, |key| std::env::var(key).ok())
    }

    /// Load config with an explicit environment lookup
    pub fn load_with_env<F>(ledger_dir: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = read_settings(ledger_dir)?;
        let defaults = Self::default();

        let mut config = Self {
            database: raw.database.unwrap_or(defaults.database),
            pool_size: raw.pool_size.unwrap_or(defaults.pool_size),
            max_attempts: raw.transfer.max_attempts.unwrap_or(defaults.max_attempts),
            timeout_ms: raw.transfer.timeout_ms.unwrap_or(defaults.timeout_ms),
            log_level: raw.logging.level.unwrap_or(defaults.log_level),
            log_json: raw.logging.json.unwrap_or(defaults.log_json),
        };

        if let Some(database) = env("LEDGER_DATABASE").filter(|v| !v.is_empty()) {
            config.database = database;
        }
        if let Some(pool_size) = parse_env(&env, "LEDGER_POOL_SIZE")? {
            config.pool_size = pool_size;
        }
        if let Some(max_attempts) = parse_env(&env, "LEDGER_MAX_ATTEMPTS")? {
            config.max_attempts = max_attempts;
        }
        if let Some(timeout_ms) = parse_env(&env, "LEDGER_TIMEOUT_MS")? {
            config.timeout_ms = timeout_ms;
        }
        config.log_json = match env("LEDGER_LOG_JSON").as_deref() {
            Some("true" | "1" | "yes" | "TRUE" | "YES") => true,
            Some("false" | "0" | "no" | "FALSE" | "NO") => false,
            _ => config.log_json,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(anyhow!("database must not be empty"));
        }
        if self.pool_size == 0 {
            return Err(anyhow!("poolSize must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("transfer.maxAttempts must be at least 1"));
        }
        Ok(())
    }

    /// Save config to the ledger directory
    /// Preserves other settings that this crate doesn't manage
    pub fn save(&self, ledger_dir: &Path) -> Result<()> {
        let mut settings = read_settings(ledger_dir)?;

        settings.database = Some(self.database.clone());
        settings.pool_size = Some(self.pool_size);
        settings.transfer.max_attempts = Some(self.max_attempts);
        settings.transfer.timeout_ms = Some(self.timeout_ms);
        settings.logging.level = Some(self.log_level.clone());
        settings.logging.json = Some(self.log_json);

        let settings_path = ledger_dir.join(SETTINGS_FILE);
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }

    /// Location of the database file
    pub fn db_path(&self, ledger_dir: &Path) -> PathBuf {
        let database = Path::new(&self.database);
        if database.is_absolute() {
            database.to_path_buf()
        } else {
            ledger_dir.join(database)
        }
    }

    pub fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy {
            max_attempts: self.max_attempts,
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
        }
    }
}

fn read_settings(ledger_dir: &Path) -> Result<SettingsFile> {
    let settings_path = ledger_dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("Failed to read {}", settings_path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Malformed settings in {}", settings_path.display()))
}

fn parse_env<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match env(key).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid value for {}: {:?}", key, value)),
        None => Ok(None),
    }
}
