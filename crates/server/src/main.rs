//! linkpeek MCP server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use linkpeek_client::{FetchClient, FetchConfig, PreviewService, PreviewSettings};
use linkpeek_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        strategy = ?config.fetch_strategy,
        "Starting linkpeek server on stdio transport"
    );

    let cache = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache at {}", config.db_path.display()))?;
    let fetcher = FetchClient::new(FetchConfig::from(&config))?;
    let preview = Arc::new(PreviewService::new(
        Arc::new(cache.clone()),
        Arc::new(fetcher),
        PreviewSettings::from(&config),
    ));

    let handler = handler::LinkPeekServer::new(cache, preview.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    preview.shutdown().await;
    tracing::info!("linkpeek server stopped");

    Ok(())
}
