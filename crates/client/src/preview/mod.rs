//! Stampede-guarded link preview lookups.
//!
//! `PreviewService::lookup` is the whole protocol:
//!
//! 1. A live record under `preview:<digest>` is returned as-is, with no
//!    network access.
//! 2. Otherwise the caller tries `set_if_absent` on `preview-lock:<digest>`.
//!    Losing that race is not an error; the caller renders the fallback.
//! 3. The winner writes a fresh token as the lock value, then either
//!    fetches inline or hands the job to the refresh queue. Either way
//!    `Refresher::run` writes the record (on success) and deletes the lock
//!    only if it still carries that token (always).
//!
//! A queued job whose lock has lapsed, or would lapse before the job
//! timeout, is dropped without fetching. The lock TTL is the only recovery
//! path for a holder that dies mid-fetch.

pub mod queue;
pub mod refresher;

pub use queue::RefreshQueue;
pub use refresher::{RefreshJob, Refresher, build_record, record_from_metadata};

use std::sync::Arc;
use std::time::Duration;

use linkpeek_core::cache::{lock_key, preview_key};
use linkpeek_core::{AppConfig, Error, FetchStrategy, KvStore, PreviewRecord};
use uuid::Uuid;

use crate::card::{CardOptions, render_preview};
use crate::fetch::{PageFetcher, canonicalize};

/// Tunables for the preview service.
#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub record_ttl: Duration,
    pub lock_ttl: Duration,
    pub job_timeout: Duration,
    pub strategy: FetchStrategy,
    pub queue_capacity: usize,
    pub max_concurrent_fetches: usize,
    pub card: CardOptions,
}

impl From<&AppConfig> for PreviewSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            record_ttl: config.record_ttl(),
            lock_ttl: config.lock_ttl(),
            job_timeout: config.job_timeout(),
            strategy: config.fetch_strategy,
            queue_capacity: config.queue_capacity,
            max_concurrent_fetches: config.max_concurrent_fetches,
            card: CardOptions { show_host: config.show_host },
        }
    }
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// What a lookup did.
#[derive(Debug)]
pub enum PreviewOutcome {
    /// Served from cache.
    Hit(PreviewRecord),
    /// This call held the lock and fetched inline.
    Fetched(PreviewRecord),
    /// This call holds the lock; the fetch runs in the background.
    Scheduled,
    /// Another caller holds the lock.
    Contended,
    /// The URL, store, fetch or extraction failed.
    Failed(Error),
}

impl PreviewOutcome {
    pub fn record(&self) -> Option<&PreviewRecord> {
        match self {
            PreviewOutcome::Hit(record) | PreviewOutcome::Fetched(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<PreviewRecord> {
        match self {
            PreviewOutcome::Hit(record) | PreviewOutcome::Fetched(record) => Some(record),
            _ => None,
        }
    }

    /// Short label for logs and tool output.
    pub fn status(&self) -> &'static str {
        match self {
            PreviewOutcome::Hit(_) => "hit",
            PreviewOutcome::Fetched(_) => "fetched",
            PreviewOutcome::Scheduled => "scheduled",
            PreviewOutcome::Contended => "contended",
            PreviewOutcome::Failed(_) => "failed",
        }
    }
}

/// Link preview lookups backed by a shared `KvStore`.
pub struct PreviewService {
    store: Arc<dyn KvStore>,
    refresher: Arc<Refresher>,
    queue: Option<RefreshQueue>,
    settings: PreviewSettings,
}

impl PreviewService {
    /// Build a service. With the background strategy this spawns the
    /// refresh dispatcher, so it must run inside a Tokio runtime.
    pub fn new(store: Arc<dyn KvStore>, fetcher: Arc<dyn PageFetcher>, settings: PreviewSettings) -> Self {
        let refresher = Arc::new(Refresher::new(store.clone(), fetcher, settings.record_ttl, settings.job_timeout));

        let queue = match settings.strategy {
            FetchStrategy::Background => Some(RefreshQueue::start(
                refresher.clone(),
                settings.queue_capacity,
                settings.max_concurrent_fetches,
            )),
            FetchStrategy::Inline => None,
        };

        Self { store, refresher, queue, settings }
    }

    pub fn settings(&self) -> &PreviewSettings {
        &self.settings
    }

    /// Return the cached preview for `url`, kicking off a fetch on a miss.
    ///
    /// `None` means the caller should render the fallback link.
    pub async fn get_preview(&self, url: &str) -> Option<PreviewRecord> {
        self.lookup(url).await.into_record()
    }

    /// Look up `url` and render the card or fallback markup.
    pub async fn render(&self, url: &str) -> (PreviewOutcome, String) {
        let outcome = self.lookup(url).await;
        let html = match canonicalize(url) {
            Ok(normalized) => render_preview(normalized.as_str(), outcome.record(), self.settings.card),
            Err(_) => render_preview(url, outcome.record(), self.settings.card),
        };
        (outcome, html)
    }

    /// Run the cache/lock protocol for `url` and report what happened.
    pub async fn lookup(&self, url: &str) -> PreviewOutcome {
        let outcome = match self.try_lookup(url).await {
            Ok(outcome) => outcome,
            Err(e) => PreviewOutcome::Failed(e),
        };

        match &outcome {
            PreviewOutcome::Failed(e) => tracing::debug!(url, error = %e, "preview unavailable"),
            other => tracing::debug!(url, status = other.status(), "preview lookup"),
        }
        outcome
    }

    /// Read the cached record for `url` without touching the lock.
    pub async fn cached(&self, url: &str) -> Result<Option<PreviewRecord>, Error> {
        let normalized = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        self.read_record(&preview_key(normalized.as_str())).await
    }

    /// Drop the cached record for `url`. Returns whether one existed.
    pub async fn invalidate(&self, url: &str) -> Result<bool, Error> {
        let normalized = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        self.store.delete(&preview_key(normalized.as_str())).await
    }

    /// Wait for background refreshes to finish. No-op for inline services.
    pub async fn shutdown(&self) {
        if let Some(queue) = &self.queue {
            queue.shutdown().await;
        }
    }

    async fn try_lookup(&self, url: &str) -> Result<PreviewOutcome, Error> {
        let normalized = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let record_key = preview_key(normalized.as_str());

        if let Some(record) = self.read_record(&record_key).await? {
            return Ok(PreviewOutcome::Hit(record));
        }

        let lock_key = lock_key(normalized.as_str());
        let token = Uuid::new_v4().to_string();
        if !self.store.set_if_absent(&lock_key, &token, self.settings.lock_ttl).await? {
            return Ok(PreviewOutcome::Contended);
        }

        let job = RefreshJob::new(normalized, record_key, lock_key, token, self.settings.lock_ttl);

        match &self.queue {
            Some(queue) => {
                let (lock_key, token) = (job.lock_key.clone(), job.token.clone());
                match queue.submit(job) {
                    Ok(()) => Ok(PreviewOutcome::Scheduled),
                    Err(e) => {
                        tracing::warn!(url, error = %e, "could not schedule refresh");
                        self.store.delete_if(&lock_key, &token).await?;
                        Err(e)
                    }
                }
            }
            None => self.refresher.run(&job).await.map(PreviewOutcome::Fetched),
        }
    }

    async fn read_record(&self, key: &str) -> Result<Option<PreviewRecord>, Error> {
        let Some(json) = self.store.get(key).await? else {
            return Ok(None);
        };

        match PreviewRecord::from_json(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unreadable preview record");
                self.store.delete(key).await?;
                Ok(None)
            }
        }
    }
}
