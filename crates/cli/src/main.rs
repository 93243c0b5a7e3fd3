//! linkpeek command-line entry point.
//!
//! Output goes to stdout; logs go to stderr so output can be piped.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use linkpeek_client::{FetchClient, FetchConfig, PreviewService, PreviewSettings};
use linkpeek_core::{AppConfig, CacheDb, FetchStrategy};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let output = match cli.command {
        Commands::Extract { file, base_url, json } => {
            let html = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            commands::extract(&html, &base_url, json, PreviewSettings::from(&config).card)?
        }
        Commands::Preview { url, json } => {
            // A one-shot process cannot wait on a background refresh.
            config.fetch_strategy = FetchStrategy::Inline;
            let (_cache, service) = open(&config).await?;
            commands::preview(&service, &url, json).await?
        }
        Commands::Purge { url } => {
            let (cache, service) = open(&config).await?;
            commands::purge(&cache, &service, url.as_deref()).await?
        }
    };

    println!("{output}");
    Ok(())
}

async fn open(config: &AppConfig) -> Result<(CacheDb, PreviewService)> {
    let cache = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache at {}", config.db_path.display()))?;
    let fetcher = FetchClient::new(FetchConfig::from(config))?;
    let service = PreviewService::new(Arc::new(cache.clone()), Arc::new(fetcher), PreviewSettings::from(config));
    Ok((cache, service))
}
