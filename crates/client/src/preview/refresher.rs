//! The lock holder's side of a preview: fetch, extract, store, release.

use std::sync::Arc;
use std::time::Duration;

use linkpeek_core::{Error, KvStore, PreviewRecord};
use tokio::time::Instant;
use url::Url;

use crate::extract::{PageMetadata, extract_metadata};
use crate::fetch::PageFetcher;

/// A fetch that the caller has already won the lock for.
#[derive(Debug, Clone)]
pub struct RefreshJob {
    pub url: Url,
    pub record_key: String,
    pub lock_key: String,
    /// Value written under `lock_key`; identifies this holder.
    pub token: String,
    /// When the lock's TTL runs out.
    pub lock_deadline: Instant,
}

impl RefreshJob {
    /// Build a job for a lock just written with `token` and `lock_ttl`.
    pub fn new(url: Url, record_key: String, lock_key: String, token: String, lock_ttl: Duration) -> Self {
        Self { url, record_key, lock_key, token, lock_deadline: Instant::now() + lock_ttl }
    }
}

/// Runs refresh jobs on behalf of whoever holds the fetch lock.
pub struct Refresher {
    store: Arc<dyn KvStore>,
    fetcher: Arc<dyn PageFetcher>,
    record_ttl: Duration,
    job_timeout: Duration,
}

impl Refresher {
    pub fn new(
        store: Arc<dyn KvStore>, fetcher: Arc<dyn PageFetcher>, record_ttl: Duration, job_timeout: Duration,
    ) -> Self {
        Self { store, fetcher, record_ttl, job_timeout }
    }

    /// Run a job to completion and release its lock.
    ///
    /// A job only fetches while it still owns the lock and the lock will
    /// outlive the job timeout; otherwise it is dropped with `LockLost`.
    /// The lock is released by compare-and-delete on every path that
    /// returns. If the task is killed before that, the lock's TTL clears it.
    pub async fn run(&self, job: &RefreshJob) -> Result<PreviewRecord, Error> {
        let started = Instant::now();

        let result = match self.check_ownership(job, started).await {
            Ok(()) => match tokio::time::timeout(self.job_timeout, self.fetch_and_store(job)).await {
                Ok(result) => result,
                Err(_) => Err(Error::FetchTimeout(format!("refresh exceeded {}ms", self.job_timeout.as_millis()))),
            },
            Err(e) => Err(e),
        };

        match self.store.delete_if(&job.lock_key, &job.token).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(url = %job.url, key = %job.lock_key, "fetch lock already gone"),
            Err(e) => tracing::warn!(url = %job.url, key = %job.lock_key, error = %e, "failed to release fetch lock"),
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(url = %job.url, elapsed_ms, "preview stored"),
            Err(e) => tracing::info!(url = %job.url, elapsed_ms, error = %e, "preview refresh failed"),
        }

        result
    }

    async fn check_ownership(&self, job: &RefreshJob, now: Instant) -> Result<(), Error> {
        if now + self.job_timeout > job.lock_deadline {
            return Err(Error::LockLost(format!("lock for {} would lapse before the refresh could finish", job.url)));
        }

        match self.store.get(&job.lock_key).await? {
            Some(token) if token == job.token => Ok(()),
            _ => Err(Error::LockLost(format!("lock for {} is held by another caller", job.url))),
        }
    }

    async fn fetch_and_store(&self, job: &RefreshJob) -> Result<PreviewRecord, Error> {
        // A previous holder may have finished between our cache miss and
        // winning the lock.
        if let Some(json) = self.store.get(&job.record_key).await?
            && let Ok(record) = PreviewRecord::from_json(&json)
        {
            tracing::debug!(url = %job.url, "record already present, skipping fetch");
            return Ok(record);
        }

        let page = self.fetcher.fetch_page(&job.url).await?;
        tracing::debug!(url = %job.url, final_url = %page.final_url, fetch_ms = page.fetch_ms, "page fetched");
        let record = build_record(&job.url, &page.html)?;

        self.store.set(&job.record_key, &record.to_json()?, self.record_ttl).await?;
        Ok(record)
    }
}

/// Turn a fetched document into a record, or `ParseFailure` when the page
/// carries no usable metadata.
pub fn build_record(url: &Url, html: &str) -> Result<PreviewRecord, Error> {
    record_from_metadata(url, extract_metadata(html, url))
}

/// Build a record from metadata that has already been extracted.
pub fn record_from_metadata(url: &Url, metadata: PageMetadata) -> Result<PreviewRecord, Error> {
    if metadata.is_empty() {
        return Err(Error::ParseFailure(format!("no title, description or image in {url}")));
    }

    Ok(PreviewRecord {
        url: url.to_string(),
        title: metadata.title.unwrap_or_default(),
        description: metadata.description.unwrap_or_default(),
        image_url: metadata.image.unwrap_or_default(),
    })
}
