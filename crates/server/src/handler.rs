//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{
    LinkPreviewParams, PreviewExtractParams, PreviewGetParams, PreviewPurgeParams, link_preview::preview_impl,
    preview_extract::extract_impl, preview_get::get_impl, preview_purge::purge_impl,
};

use linkpeek_client::PreviewService;
use linkpeek_core::CacheDb;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for linkpeek.
#[derive(Clone)]
pub struct LinkPeekServer {
    tool_router: ToolRouter<Self>,
    cache: CacheDb,
    preview: Arc<PreviewService>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl LinkPeekServer {
    /// Create a new server handler over a shared cache and preview service.
    pub fn new(cache: CacheDb, preview: Arc<PreviewService>) -> Self {
        Self { tool_router: Self::tool_router(), cache, preview }
    }

    /// Render a link preview card.
    ///
    /// Never fails on fetch problems: a URL without a cached record renders
    /// as a plain link while the record is fetched.
    #[tool(
        description = "Render an HTML link preview card for a URL. Returns the card (or a plain fallback link on a cache miss) and the cached title, description and image when available."
    )]
    async fn link_preview(&self, params: Parameters<LinkPreviewParams>) -> Result<CallToolResult, McpError> {
        preview_impl(&self.preview, params.0).await
    }

    #[tool(description = "Return the cached preview record for a URL without fetching. Fails with CACHE_MISS if absent.")]
    async fn preview_get(&self, params: Parameters<PreviewGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.preview, params.0).await
    }

    /// Extract preview metadata from HTML.
    ///
    /// No network requests are made.
    #[tool(
        description = "Extract title, description and image from raw HTML using Open Graph, Twitter and standard meta tags. Relative image URLs are resolved against base_url."
    )]
    async fn preview_extract(&self, params: Parameters<PreviewExtractParams>) -> Result<CallToolResult, McpError> {
        extract_impl(params.0, self.preview.settings().card).await
    }

    #[tool(description = "Delete the cached preview for one URL, or purge all expired entries when no URL is given.")]
    async fn preview_purge(&self, params: Parameters<PreviewPurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.cache, &self.preview, params.0).await
    }
}

impl ServerHandler for LinkPeekServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "linkpeek".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Use link_preview to render a card for a URL. Misses return a plain link and fill the cache \
                 in the background; call again later for the full card."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{PAGE, inline_service};

    #[tokio::test]
    async fn test_lists_all_tools() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let server = LinkPeekServer::new(cache.clone(), inline_service(&cache, PAGE));

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, ["link_preview", "preview_extract", "preview_get", "preview_purge"]);
    }

    #[tokio::test]
    async fn test_server_info() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let server = LinkPeekServer::new(cache.clone(), inline_service(&cache, PAGE));

        let info = server.get_info();
        assert_eq!(info.server_info.name, "linkpeek");
        assert!(info.capabilities.tools.is_some());
    }
}
