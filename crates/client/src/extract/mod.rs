//! Preview metadata extraction from HTML meta tags.
//!
//! Each field is looked up in a fixed priority order and the first source
//! with a non-empty value wins:
//!
//! | field       | sources                                                        |
//! |-------------|----------------------------------------------------------------|
//! | title       | `og:title`, `twitter:title`, `<title>`                          |
//! | description | `og:description`, `twitter:description`, `meta[name=description]` |
//! | image       | `og:image:secure_url`, `og:image`, `twitter:image`              |
//!
//! Extraction is a pure function of the document and base URL; it never
//! touches the network.

pub mod image;

pub use image::resolve_image_url;

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

/// One place a field's value may come from.
enum Source {
    /// `content` attribute of the first matching element.
    Content(Selector),
    /// Text of the first matching element.
    Text(Selector),
}

impl Source {
    fn content(css: &str) -> Self {
        Source::Content(Selector::parse(css).expect("invalid selector"))
    }

    fn text(css: &str) -> Self {
        Source::Text(Selector::parse(css).expect("invalid selector"))
    }

    fn read(&self, document: &Html) -> Option<String> {
        let value = match self {
            Source::Content(selector) => document
                .select(selector)
                .find_map(|el| el.value().attr("content").map(str::trim).filter(|v| !v.is_empty()))
                .map(str::to_string),
            Source::Text(selector) => document
                .select(selector)
                .map(|el| el.text().collect::<String>())
                .find(|text| !text.trim().is_empty()),
        }?;
        Some(collapse_whitespace(&value))
    }
}

static TITLE_SOURCES: LazyLock<[Source; 3]> = LazyLock::new(|| {
    [
        Source::content(r#"meta[property="og:title"]"#),
        Source::content(r#"meta[name="twitter:title"]"#),
        Source::text("title"),
    ]
});

static DESCRIPTION_SOURCES: LazyLock<[Source; 3]> = LazyLock::new(|| {
    [
        Source::content(r#"meta[property="og:description"]"#),
        Source::content(r#"meta[name="twitter:description"]"#),
        Source::content(r#"meta[name="description"]"#),
    ]
});

static IMAGE_SOURCES: LazyLock<[Source; 3]> = LazyLock::new(|| {
    [
        Source::content(r#"meta[property="og:image:secure_url"]"#),
        Source::content(r#"meta[property="og:image"]"#),
        Source::content(r#"meta[name="twitter:image"]"#),
    ]
});

/// Metadata scraped from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absolute image URL, already resolved against the page URL.
    pub image: Option<String>,
}

impl PageMetadata {
    /// True when none of the fields were found.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.image.is_none()
    }
}

fn first_match(document: &Html, sources: &[Source]) -> Option<String> {
    sources.iter().find_map(|source| source.read(document))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract preview metadata from an HTML document.
///
/// Relative image references are resolved against `base_url`.
pub fn extract_metadata(html: &str, base_url: &Url) -> PageMetadata {
    let document = Html::parse_document(html);

    let title = first_match(&document, TITLE_SOURCES.as_slice());
    let description = first_match(&document, DESCRIPTION_SOURCES.as_slice());
    let image = first_match(&document, IMAGE_SOURCES.as_slice()).and_then(|raw| resolve_image_url(&raw, base_url));

    PageMetadata { title, description, image }
}
