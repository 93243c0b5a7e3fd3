//! Client code for linkpeek.
//!
//! This crate provides the guarded HTTP fetch, metadata extraction, card
//! rendering and the stampede-protected preview service shared by the
//! server and CLI.

pub mod card;
pub mod extract;
pub mod fetch;
pub mod preview;

pub use card::{CardOptions, render_card, render_fallback, render_preview};
pub use extract::{PageMetadata, extract_metadata, resolve_image_url};
pub use fetch::{FetchClient, FetchConfig, FetchResponse, FetchedPage, PageFetcher};
pub use preview::{PreviewOutcome, PreviewService, PreviewSettings};
