//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Render and manage link preview cards
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Cache database path (overrides LINKPEEK_DB_PATH and the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the preview card for a URL, fetching it on a cache miss
    Preview {
        /// the page URL
        url: String,

        /// print the lookup result as JSON instead of markup
        #[arg(long)]
        json: bool,
    },

    /// Extract preview metadata from a saved HTML file. No network access.
    Extract {
        /// HTML file to read
        file: PathBuf,

        /// URL the file was served from, for resolving relative images
        #[arg(long = "base-url")]
        base_url: String,

        /// print the metadata as JSON instead of card markup
        #[arg(long)]
        json: bool,
    },

    /// Delete one URL's cached preview, or every expired entry
    Purge {
        /// only drop the record for this URL
        #[arg(long)]
        url: Option<String>,
    },
}
