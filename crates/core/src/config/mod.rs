//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (LINKPEEK_*)
//! 2. TOML config file (if LINKPEEK_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// How the lock holder performs the fetch after winning the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Hand the fetch to the refresh queue and return the fallback immediately.
    #[default]
    Background,
    /// Fetch synchronously while the caller waits.
    Inline,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (LINKPEEK_*)
/// 2. TOML config file (if LINKPEEK_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via LINKPEEK_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for outbound fetches.
    ///
    /// Set via LINKPEEK_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via LINKPEEK_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Maximum bytes to read from a page.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Lifetime of a stored preview record, in seconds.
    #[serde(default = "default_record_ttl_secs")]
    pub record_ttl_secs: u64,

    /// Lifetime of a fetch lock, in seconds.
    ///
    /// This is the only recovery path when a lock holder dies.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Inline or background fetching for the lock holder.
    ///
    /// Set via LINKPEEK_FETCH_STRATEGY (`background` or `inline`).
    #[serde(default)]
    pub fetch_strategy: FetchStrategy,

    /// Pending background refreshes before new ones are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Background refreshes allowed to run at once.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Refuse to fetch hosts that resolve to private or reserved addresses.
    #[serde(default = "default_true")]
    pub block_private_addresses: bool,

    /// Append the source hostname to card titles.
    #[serde(default = "default_true")]
    pub show_host: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./linkpeek-cache.sqlite")
}

fn default_user_agent() -> String {
    "linkpeek/0.1 (VisualLinkPreview/1.0)".into()
}

/// Slack added to `timeout_ms` to bound a whole refresh job.
pub const JOB_TIMEOUT_MARGIN: Duration = Duration::from_secs(2);

fn default_timeout_ms() -> u64 {
    8_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_record_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_lock_ttl_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_bytes: default_max_bytes(),
            record_ttl_secs: default_record_ttl_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            fetch_strategy: FetchStrategy::default(),
            queue_capacity: default_queue_capacity(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            block_private_addresses: true,
            show_host: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Upper bound on one refresh: the fetch timeout plus slack for
    /// extraction and the store write. The lock TTL must exceed it.
    pub fn job_timeout(&self) -> Duration {
        self.timeout() + JOB_TIMEOUT_MARGIN
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `LINKPEEK_`
    /// 2. TOML file from `LINKPEEK_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("LINKPEEK_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("LINKPEEK_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
