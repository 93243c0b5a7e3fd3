//! MCP tool implementations.
//!
//! This module contains all tools exposed by the linkpeek server.
#![allow(unused_imports)]

pub mod link_preview;
pub mod preview_extract;
pub mod preview_get;
pub mod preview_purge;

pub use link_preview::{LinkPreviewOutput, LinkPreviewParams};
pub use preview_extract::{PreviewExtractOutput, PreviewExtractParams};
pub use preview_get::{PreviewGetOutput, PreviewGetParams};
pub use preview_purge::{PreviewPurgeOutput, PreviewPurgeParams};

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use linkpeek_core::Error;

/// Wrap a tool's output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, Error> {
    let json = serde_json::to_string_pretty(output)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
