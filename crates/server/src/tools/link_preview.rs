//! link_preview tool implementation.
//!
//! Renders the preview card for a URL. A cache hit returns the card; a
//! miss returns the fallback link and starts a refresh (or, with the inline
//! strategy, fetches first). The tool itself only errors on encoding
//! failures: every preview failure is reported through `status`.

use linkpeek_client::{PreviewOutcome, PreviewService};
use linkpeek_core::PreviewRecord;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Input parameters for link_preview tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkPreviewParams {
    /// The page URL to preview.
    pub url: String,
}

/// Output structure for link_preview tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkPreviewOutput {
    /// The URL as given.
    pub url: String,
    /// One of: hit, fetched, scheduled, contended, failed.
    pub status: String,
    /// Card markup, or the fallback link when no record is available.
    pub html: String,
    /// The cached record, when one was served.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<PreviewRecord>,
    /// Why no record was served, for `failed` lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Implementation of the link_preview tool.
pub async fn preview_impl(service: &PreviewService, params: LinkPreviewParams) -> Result<CallToolResult, McpError> {
    let (outcome, html) = service.render(&params.url).await;

    let error = match &outcome {
        PreviewOutcome::Failed(e) => Some(e.to_string()),
        _ => None,
    };
    let output = LinkPreviewOutput {
        url: params.url,
        status: outcome.status().to_string(),
        html,
        error,
        record: outcome.into_record(),
    };

    Ok(json_result(&output)?)
}
