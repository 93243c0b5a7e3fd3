//! preview_extract tool implementation.
//!
//! Runs metadata extraction on caller-supplied HTML. No network I/O is
//! performed and nothing is cached.

use linkpeek_client::fetch::canonicalize;
use linkpeek_client::preview::record_from_metadata;
use linkpeek_client::{CardOptions, extract_metadata, render_card, render_fallback};
use linkpeek_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Input parameters for preview_extract tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PreviewExtractParams {
    /// The raw HTML document.
    pub html: String,

    /// URL the document was served from. Relative image references are
    /// resolved against it.
    pub base_url: String,
}

/// Output structure for preview_extract tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PreviewExtractOutput {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absolute http(s) image URL.
    pub image: Option<String>,
    /// Card markup for the extracted fields, or the fallback link when
    /// nothing usable was found.
    pub card: String,
}

/// Implementation of the preview_extract tool.
pub async fn extract_impl(params: PreviewExtractParams, options: CardOptions) -> Result<CallToolResult, McpError> {
    if params.html.trim().is_empty() {
        return Err(Error::InvalidInput("html cannot be empty".into()).into());
    }

    let base_url = canonicalize(&params.base_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let metadata = extract_metadata(&params.html, &base_url);

    let card = match record_from_metadata(&base_url, metadata.clone()) {
        Ok(record) => render_card(&record, options),
        Err(_) => render_fallback(base_url.as_str()),
    };

    let output =
        PreviewExtractOutput { title: metadata.title, description: metadata.description, image: metadata.image, card };
    Ok(json_result(&output)?)
}
