//! `KvStore` on top of the SQLite cache.
//!
//! Expiry is stored as unix milliseconds. Rows past their expiry are
//! invisible to reads and are physically removed by `purge_expired` or
//! when `set_if_absent` claims the key again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{OptionalExtension, TransactionBehavior};

use super::connection::CacheDb;
use super::store::KvStore;
use crate::Error;

fn expiry_ms(now_ms: i64, ttl: Duration) -> i64 {
    now_ms.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl KvStore for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let value = conn
                    .query_row(
                        "SELECT value FROM kv_entries WHERE key = ?1 AND expires_at_ms > ?2",
                        params![key, now],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(Error::from)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Error> {
        let key = key.to_string();
        let value = value.to_string();
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let expires_at = expiry_ms(now_ms, ttl);
        let written_at = now.to_rfc3339();

        self.conn
            .call(move |conn| -> Result<bool, Error> {
                // IMMEDIATE takes the write lock up front so two processes
                // cannot both observe the key as free.
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute("DELETE FROM kv_entries WHERE key = ?1 AND expires_at_ms <= ?2", params![key, now_ms])?;
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO kv_entries (key, value, expires_at_ms, written_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![key, value, expires_at, written_at],
                )?;
                tx.commit()?;
                Ok(inserted == 1)
            })
            .await
            .map_err(Error::from)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let now = Utc::now();
        let expires_at = expiry_ms(now.timestamp_millis(), ttl);
        let written_at = now.to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO kv_entries (key, value, expires_at_ms, written_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        expires_at_ms = excluded.expires_at_ms,
                        written_at = excluded.written_at",
                    params![key, value, expires_at, written_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_if(&self, key: &str, value: &str) -> Result<bool, Error> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count =
                    conn.execute("DELETE FROM kv_entries WHERE key = ?1 AND value = ?2", params![key, value])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheDb {
    /// Delete expired entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM kv_entries WHERE expires_at_ms <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Count live entries whose key starts with `prefix`.
    pub async fn count(&self, prefix: &str) -> Result<u64, Error> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM kv_entries WHERE key LIKE ?1 ESCAPE '\\' AND expires_at_ms > ?2",
                    params![pattern, now],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_set_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set("preview:abc", r#"{"old":1}"#, HOUR).await.unwrap();
        db.set("preview:abc", r#"{"new":2}"#, HOUR).await.unwrap();

        let value = db.get("preview:abc").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"{"new":2}"#));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.set_if_absent("preview-lock:abc", "1", HOUR).await.unwrap());
        assert!(!db.set_if_absent("preview-lock:abc", "1", HOUR).await.unwrap());

        assert!(db.delete("preview-lock:abc").await.unwrap());
        assert!(db.set_if_absent("preview-lock:abc", "1", HOUR).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_leaves_other_holder() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.set_if_absent("preview-lock:abc", "token-b", HOUR).await.unwrap());

        assert!(!db.delete_if("preview-lock:abc", "token-a").await.unwrap());
        assert_eq!(db.get("preview-lock:abc").await.unwrap().as_deref(), Some("token-b"));

        assert!(db.delete_if("preview-lock:abc", "token-b").await.unwrap());
        assert!(db.get("preview-lock:abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_reacquired() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.set_if_absent("preview-lock:abc", "1", Duration::from_secs(1)).await.unwrap());
        assert!(!db.set_if_absent("preview-lock:abc", "1", Duration::from_secs(1)).await.unwrap());

        tokio::time::sleep(tokio::time::Duration::from_millis(1100)).await;

        assert!(db.get("preview-lock:abc").await.unwrap().is_none());
        assert!(db.set_if_absent("preview-lock:abc", "2", HOUR).await.unwrap());
        assert_eq!(db.get("preview-lock:abc").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set("expiring", "{}", Duration::from_secs(1)).await.unwrap();
        db.set("fresh", "{}", HOUR).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(1100)).await;

        let deleted = db.purge_expired().await.unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_count_by_prefix() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set("preview:a", "{}", HOUR).await.unwrap();
        db.set("preview:b", "{}", HOUR).await.unwrap();
        db.set("preview-lock:a", "1", HOUR).await.unwrap();

        assert_eq!(db.count("preview:").await.unwrap(), 2);
        assert_eq!(db.count("preview-lock:").await.unwrap(), 1);
        assert_eq!(db.count("").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_two_handles_share_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.sqlite");
        let first = CacheDb::open(&path).await.unwrap();
        let second = CacheDb::open(&path).await.unwrap();

        assert!(first.set_if_absent("preview-lock:x", "1", HOUR).await.unwrap());
        assert!(!second.set_if_absent("preview-lock:x", "1", HOUR).await.unwrap());

        first.delete("preview-lock:x").await.unwrap();
        assert!(second.set_if_absent("preview-lock:x", "1", HOUR).await.unwrap());
    }
}
