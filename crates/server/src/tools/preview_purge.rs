//! preview_purge tool implementation.
//!
//! Drops one URL's cached record, or sweeps every expired entry.

use linkpeek_client::PreviewService;
use linkpeek_core::CacheDb;
use linkpeek_core::cache::PREVIEW_PREFIX;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the preview_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PreviewPurgeParams {
    /// Drop the record for this URL. When omitted, expired entries are
    /// purged instead.
    #[serde(default)]
    pub url: Option<String>,
}

/// Output from the preview_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PreviewPurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
    /// Live preview records left in the cache.
    pub remaining: u64,
}

/// Implementation of the preview_purge tool.
pub async fn purge_impl(
    cache: &CacheDb, service: &PreviewService, params: PreviewPurgeParams,
) -> Result<CallToolResult, McpError> {
    let deleted = match params.url {
        Some(url) => u64::from(service.invalidate(&url).await?),
        None => cache.purge_expired().await?,
    };
    let remaining = cache.count(PREVIEW_PREFIX).await?;

    tracing::info!(deleted, remaining, "preview cache purged");
    Ok(json_result(&PreviewPurgeOutput { deleted, remaining })?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tools::testing::{PAGE, decode, inline_service};
    use linkpeek_core::KvStore;

    #[tokio::test]
    async fn test_purge_single_url() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let service = inline_service(&cache, PAGE);
        service.lookup("https://example.com/a").await;
        service.lookup("https://example.com/b").await;

        let params = PreviewPurgeParams { url: Some("https://example.com/a".into()) };
        let output: PreviewPurgeOutput = decode(&purge_impl(&cache, &service, params).await.unwrap());
        assert_eq!(output.deleted, 1);
        assert_eq!(output.remaining, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let service = inline_service(&cache, PAGE);
        service.lookup("https://example.com/live").await;
        cache.set("preview:stale", "{}", Duration::ZERO).await.unwrap();

        let output: PreviewPurgeOutput =
            decode(&purge_impl(&cache, &service, PreviewPurgeParams::default()).await.unwrap());
        assert_eq!(output.deleted, 1);
        assert_eq!(output.remaining, 1);
    }

    #[tokio::test]
    async fn test_purge_invalid_url() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let service = inline_service(&cache, PAGE);

        let params = PreviewPurgeParams { url: Some("ftp://example.com/".into()) };
        assert!(purge_impl(&cache, &service, params).await.is_err());
    }
}
