//! Subcommand implementations.
//!
//! Each returns the text to print so the binary stays a thin shell.

use anyhow::{Context, Result};
use linkpeek_client::fetch::canonicalize;
use linkpeek_client::preview::record_from_metadata;
use linkpeek_client::{
    CardOptions, PageMetadata, PreviewOutcome, PreviewService, extract_metadata, render_card, render_fallback,
};
use linkpeek_core::cache::PREVIEW_PREFIX;
use linkpeek_core::{CacheDb, PreviewRecord};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct PreviewReport<'a> {
    url: &'a str,
    status: &'static str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<&'a PreviewRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Look up `url` and return the card (or fallback) markup.
pub async fn preview(service: &PreviewService, url: &str, json: bool) -> Result<String> {
    let (outcome, html) = service.render(url).await;

    if let PreviewOutcome::Failed(e) = &outcome {
        tracing::warn!(url, error = %e, "no preview available");
    }

    if !json {
        return Ok(html);
    }

    let report = PreviewReport {
        url,
        status: outcome.status(),
        html: &html,
        record: outcome.record(),
        error: match &outcome {
            PreviewOutcome::Failed(e) => Some(e.to_string()),
            _ => None,
        },
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Extract metadata from a saved document.
pub fn extract(html: &str, base_url: &str, json: bool, options: CardOptions) -> Result<String> {
    let base = canonicalize(base_url).with_context(|| format!("invalid base URL {base_url:?}"))?;

    let metadata: PageMetadata = extract_metadata(html, &base);
    if json {
        return Ok(serde_json::to_string_pretty(&metadata)?);
    }

    Ok(match record_from_metadata(&base, metadata) {
        Ok(record) => render_card(&record, options),
        Err(e) => {
            tracing::warn!(error = %e, "rendering fallback");
            render_fallback(base.as_str())
        }
    })
}

/// Drop one URL's record or sweep expired entries.
pub async fn purge(cache: &CacheDb, service: &PreviewService, url: Option<&str>) -> Result<String> {
    let deleted = match url {
        Some(url) => u64::from(service.invalidate(url).await?),
        None => cache.purge_expired().await?,
    };
    let remaining = cache.count(PREVIEW_PREFIX).await?;
    Ok(format!("deleted {deleted}, {remaining} previews remaining"))
}
