//! The storage seam between the preview service and its backing store.

use std::time::Duration;

use async_trait::async_trait;

use crate::Error;

/// Shared key-value store with per-entry TTLs.
///
/// Implementations must make `set_if_absent` atomic across every caller
/// sharing the store, and must treat an expired entry as absent.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a live value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Store `value` only if no live entry exists for `key`.
    ///
    /// Returns `true` when this call wrote the entry.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Error>;

    /// Store `value`, replacing any existing entry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error>;

    /// Remove an entry. Returns whether a live or expired entry existed.
    async fn delete(&self, key: &str) -> Result<bool, Error>;

    /// Remove `key` only while it still holds `value`.
    ///
    /// Returns `true` when this call removed the entry. Lock holders
    /// release through this so a lock that lapsed and was re-acquired by
    /// someone else is left alone.
    async fn delete_if(&self, key: &str, value: &str) -> Result<bool, Error>;
}
