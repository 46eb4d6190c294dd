//! Configuration management for Quotacast
//!
//! Settings come from an optional TOML file, then from `QUOTACAST_*`
//! environment variables, then are validated. Every section has defaults, so
//! an empty or missing file is a valid configuration.
//!
//! ```toml
//! [quota]
//! daily_limit = 3
//! monthly_limit = 90
//!
//! [quality]
//! threshold = 0.8
//!
//! [publish]
//! max_retries = 2
//! rate_limit_cooldown_secs = 900
//!
//! [storage]
//! ledger_path = "~/.local/share/quotacast/usage_data.json"
//!
//! [transport]
//! command = "toot post"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dedup::DEFAULT_DUPLICATE_RETENTION;
use crate::error::{ConfigError, QuotacastError, Result};
use crate::generator::{default_topics, TopicCatalog};
use crate::ledger::{QuotaLimits, UsageLedger, DEFAULT_DAILY_LIMIT, DEFAULT_HISTORY_RETENTION, DEFAULT_MONTHLY_LIMIT};
use crate::publisher::{
    RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_QUALITY_THRESHOLD, DEFAULT_RATE_LIMIT_COOLDOWN,
    DEFAULT_RETRY_BASE_DELAY,
};
use crate::types::Topic;

pub const ENV_CONFIG_PATH: &str = "QUOTACAST_CONFIG";
pub const ENV_DAILY_LIMIT: &str = "QUOTACAST_DAILY_LIMIT";
pub const ENV_MONTHLY_LIMIT: &str = "QUOTACAST_MONTHLY_LIMIT";
pub const ENV_QUALITY_THRESHOLD: &str = "QUOTACAST_QUALITY_THRESHOLD";
pub const ENV_MAX_RETRIES: &str = "QUOTACAST_MAX_RETRIES";
pub const ENV_DUPLICATE_RETENTION: &str = "QUOTACAST_DUPLICATE_RETENTION";
pub const ENV_HISTORY_RETENTION: &str = "QUOTACAST_HISTORY_RETENTION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub quota: QuotaConfig,
    pub quality: QualityConfig,
    pub publish: PublishConfig,
    pub storage: StorageConfig,
    pub generator: CommandConfig,
    pub transport: CommandConfig,
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub daily_limit: u32,
    pub monthly_limit: u32,
    /// Minimum seconds between two posts; 0 disables the check
    pub min_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub max_retries: u32,
    pub rate_limit_cooldown_secs: u64,
    pub retry_base_delay_secs: u64,
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub ledger_path: String,
    pub duplicate_index_path: String,
    pub history_retention: usize,
    pub duplicate_retention: usize,
    /// Guard each run with an exclusive lock file next to the ledger
    pub lock: bool,
}

/// External command settings shared by the generator and the transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quota: QuotaConfig::default(),
            quality: QualityConfig::default(),
            publish: PublishConfig::default(),
            storage: StorageConfig::default(),
            generator: CommandConfig::default(),
            transport: CommandConfig::default(),
            topics: default_topics(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            min_interval_secs: 0,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_cooldown_secs: DEFAULT_RATE_LIMIT_COOLDOWN.as_secs(),
            retry_base_delay_secs: DEFAULT_RETRY_BASE_DELAY.as_secs(),
            run_timeout_secs: 30 * 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_data_file("usage_data.json"),
            duplicate_index_path: default_data_file("content_hashes.json"),
            history_retention: DEFAULT_HISTORY_RETENTION,
            duplicate_retention: DEFAULT_DUPLICATE_RETENTION,
            lock: true,
        }
    }
}

fn default_data_file(name: &str) -> String {
    resolve_data_path()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|_| PathBuf::from(name))
        .to_string_lossy()
        .to_string()
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// and the result is validated.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_or_default(&config_path)
    }

    /// Like [`Config::load`] but from an explicit path
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load_from_path(path)?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file without overrides or validation
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Apply `QUOTACAST_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override(&lookup, ENV_DAILY_LIMIT)? {
            self.quota.daily_limit = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MONTHLY_LIMIT)? {
            self.quota.monthly_limit = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_QUALITY_THRESHOLD)? {
            self.quality.threshold = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MAX_RETRIES)? {
            self.publish.max_retries = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_DUPLICATE_RETENTION)? {
            self.storage.duplicate_retention = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_HISTORY_RETENTION)? {
            self.storage.history_retention = v;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.quota.daily_limit == 0 {
            return Err(invalid("quota.daily_limit", "must be at least 1").into());
        }
        if self.quota.monthly_limit == 0 {
            return Err(invalid("quota.monthly_limit", "must be at least 1").into());
        }
        if !(0.0..=1.0).contains(&self.quality.threshold) {
            return Err(invalid("quality.threshold", "must be between 0.0 and 1.0").into());
        }
        if self.publish.max_retries == 0 {
            return Err(invalid("publish.max_retries", "must be at least 1").into());
        }
        if self.publish.run_timeout_secs == 0 {
            return Err(invalid("publish.run_timeout_secs", "must be at least 1").into());
        }
        if self.publish.run_timeout_secs <= self.publish.rate_limit_cooldown_secs {
            return Err(invalid(
                "publish.run_timeout_secs",
                "must be greater than publish.rate_limit_cooldown_secs",
            )
            .into());
        }
        if self.storage.history_retention == 0 {
            return Err(invalid("storage.history_retention", "must be at least 1").into());
        }
        if self.storage.duplicate_retention == 0 {
            return Err(invalid("storage.duplicate_retention", "must be at least 1").into());
        }
        for topic in &self.topics {
            if !(topic.quality_multiplier > 0.0 && topic.quality_multiplier <= 1.0) {
                return Err(invalid(
                    &format!("topics.{}.quality_multiplier", topic.name),
                    "must be greater than 0.0 and at most 1.0",
                )
                .into());
            }
            if topic.hashtags.is_empty() {
                return Err(invalid(&format!("topics.{}.hashtags", topic.name), "must not be empty").into());
            }
        }
        Ok(())
    }

    pub fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            daily: self.quota.daily_limit,
            monthly: self.quota.monthly_limit,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.publish.max_retries,
            rate_limit_cooldown: Duration::from_secs(self.publish.rate_limit_cooldown_secs),
            base_delay: Duration::from_secs(self.publish.retry_base_delay_secs),
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.publish.run_timeout_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.quota.min_interval_secs)
    }

    pub fn topic_catalog(&self) -> TopicCatalog {
        TopicCatalog::new(self.topics.clone())
    }

    pub fn ledger_path(&self) -> PathBuf {
        expand_path(&self.storage.ledger_path)
    }

    pub fn duplicate_index_path(&self) -> PathBuf {
        expand_path(&self.storage.duplicate_index_path)
    }

    /// Ledger over the configured store, limits and retention
    pub fn usage_ledger(&self) -> UsageLedger {
        UsageLedger::new(
            self.ledger_path(),
            self.quota_limits(),
            self.storage.history_retention,
        )
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| {
                QuotacastError::from(ConfigError::InvalidValue {
                    field: key.to_string(),
                    reason: format!("'{}': {}", raw, e),
                })
            }),
        None => Ok(None),
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        return Ok(expand_path(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("quotacast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("quotacast"))
}
