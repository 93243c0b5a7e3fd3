//! Process-local `KvStore`.
//!
//! Expiry is measured with `tokio::time::Instant`, so tests running on a
//! paused runtime can move past a TTL with `tokio::time::advance`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::store::KvStore;
use crate::Error;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory store guarded by a single async mutex.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().await.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries.get(key).filter(|e| e.is_live(now)).map(|e| e.value.clone()))
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Error> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry { value: value.to_string(), expires_at: now + ttl });
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry { value: value.to_string(), expires_at: now + ttl });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }

    async fn delete_if(&self, key: &str, value: &str) -> Result<bool, Error> {
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.value == value) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());

        store.set("k", "v1", MINUTE).await.unwrap();
        store.set("k", "v2", MINUTE).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_delete_if_checks_value() {
        let store = MemoryStore::new();
        store.set("lock", "mine", MINUTE).await.unwrap();

        assert!(!store.delete_if("lock", "theirs").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("mine"));

        assert!(store.delete_if("lock", "mine").await.unwrap());
        assert!(store.get("lock").await.unwrap().is_none());
        assert!(!store.delete_if("lock", "mine").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_absent_only_first_wins() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("lock", "1", MINUTE).await.unwrap());
        assert!(!store.set_if_absent("lock", "2", MINUTE).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_absent() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("lock", "1", Duration::from_secs(30)).await.unwrap());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!store.set_if_absent("lock", "2", Duration::from_secs(30)).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("lock").await.unwrap().is_none());
        assert!(store.set_if_absent("lock", "2", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.set("k", "v", MINUTE).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.set("short", "v", Duration::from_secs(1)).await.unwrap();
        store.set("long", "v", MINUTE).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_set_if_absent_single_winner() {
        let store = MemoryStore::new();
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.spawn(async move { store.set_if_absent("lock", &i.to_string(), MINUTE).await.unwrap() });
        }

        let mut winners = 0;
        while let Some(won) = tasks.join_next().await {
            if won.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
