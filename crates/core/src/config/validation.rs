//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 60 seconds
    /// - `max_redirects` exceeds 20
    /// - `max_bytes` is 0 or exceeds 20MB
    /// - `record_ttl_secs` is 0
    /// - the lock would expire before a fetch times out
    /// - `queue_capacity` is 0
    /// - `max_concurrent_fetches` is 0 or exceeds 64
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 60_000 {
            return Err(invalid("timeout_ms", "must not exceed 60 seconds (60000ms)"));
        }

        if self.max_redirects > 20 {
            return Err(invalid("max_redirects", "must not exceed 20"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 20 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 20MB"));
        }

        if self.record_ttl_secs == 0 {
            return Err(invalid("record_ttl_secs", "must be greater than 0"));
        }

        if self.lock_ttl() <= self.job_timeout() {
            return Err(invalid("lock_ttl_secs", "must outlast timeout_ms plus the refresh margin"));
        }

        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be greater than 0"));
        }

        if self.max_concurrent_fetches == 0 || self.max_concurrent_fetches > 64 {
            return Err(invalid("max_concurrent_fetches", "must be between 1 and 64"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.record_ttl_secs < self.lock_ttl_secs {
            tracing::warn!(
                record_ttl_secs = self.record_ttl_secs,
                lock_ttl_secs = self.lock_ttl_secs,
                "record TTL is shorter than the lock TTL; previews will be refetched often"
            );
        }

        Ok(())
    }
}
