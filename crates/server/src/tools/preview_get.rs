//! preview_get tool implementation.
//!
//! Reads the cached record for a URL. Never fetches and never takes the
//! fetch lock.

use linkpeek_client::PreviewService;
use linkpeek_core::{Error, PreviewRecord};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the preview_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PreviewGetParams {
    /// The page URL whose cached preview to return.
    pub url: String,
}

/// Output from the preview_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PreviewGetOutput {
    /// The cached record.
    pub record: PreviewRecord,
}

/// Implementation of the preview_get tool.
pub async fn get_impl(service: &PreviewService, params: PreviewGetParams) -> Result<CallToolResult, McpError> {
    let record = service
        .cached(&params.url)
        .await?
        .ok_or_else(|| Error::CacheMiss(params.url.clone()))?;

    Ok(json_result(&PreviewGetOutput { record })?)
}
