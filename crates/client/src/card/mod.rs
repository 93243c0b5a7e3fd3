//! HTML card markup for link previews.
//!
//! Rendering is infallible: a record becomes a card, anything else becomes
//! a plain link. Every interpolated value is escaped, and only http(s)
//! URLs are ever written into `href`/`src`.

use html_escape::{encode_double_quoted_attribute, encode_text};
use linkpeek_core::PreviewRecord;

use crate::fetch::{canonicalize, is_web_url};

/// Rendering switches.
#[derive(Debug, Clone, Copy)]
pub struct CardOptions {
    /// Suffix the title with the source hostname.
    pub show_host: bool,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self { show_host: true }
    }
}

const WRAPPER_OPEN: &str = r#"<div class="link-preview">"#;
const WRAPPER_CLOSE: &str = "</div>";

/// Render a preview card, or the fallback link when `record` is `None`.
pub fn render_preview(url: &str, record: Option<&PreviewRecord>, options: CardOptions) -> String {
    match record {
        Some(record) => render_card(record, options),
        None => render_fallback(url),
    }
}

/// Render the full card for a record.
pub fn render_card(record: &PreviewRecord, options: CardOptions) -> String {
    if !is_web_url(&record.url) {
        return render_fallback(&record.url);
    }

    let mut out = String::with_capacity(512);
    out.push_str(WRAPPER_OPEN);
    out.push_str(r#"<a class="link-card" href=""#);
    out.push_str(&encode_double_quoted_attribute(&record.url));
    out.push_str(r#"" target="_blank" rel="noopener noreferrer">"#);

    if record.has_image() && is_web_url(&record.image_url) {
        out.push_str(r#"<div class="link-card__media"><img src=""#);
        out.push_str(&encode_double_quoted_attribute(&record.image_url));
        out.push_str(r#"" alt="" loading="lazy" /></div>"#);
    }

    out.push_str(r#"<div class="link-card__content">"#);
    if !record.title.is_empty() {
        out.push_str(r#"<div class="link-card__title">"#);
        out.push_str(&encode_text(&record.title));
        if options.show_host
            && let Some(host) = host_of(&record.url)
        {
            out.push_str(r#" <span class="link-card__dot">·</span> <span class="link-card__host">"#);
            out.push_str(&encode_text(&host));
            out.push_str("</span>");
        }
        out.push_str("</div>");
    }
    if !record.description.is_empty() {
        out.push_str(r#"<div class="link-card__desc">"#);
        out.push_str(&encode_text(&record.description));
        out.push_str("</div>");
    }
    out.push_str("</div></a>");
    out.push_str(WRAPPER_CLOSE);
    out
}

/// Render the degraded form: a bare link to `url`.
///
/// A blank URL renders nothing; a non-web URL renders as escaped text
/// without a link.
pub fn render_fallback(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(192);
    out.push_str(WRAPPER_OPEN);
    if is_web_url(url) {
        out.push_str(r#"<a class="link-preview__fallback" href=""#);
        out.push_str(&encode_double_quoted_attribute(url));
        out.push_str(r#"" target="_blank" rel="noopener noreferrer">"#);
        out.push_str(&encode_text(url));
        out.push_str("</a>");
    } else {
        out.push_str(r#"<span class="link-preview__fallback">"#);
        out.push_str(&encode_text(url));
        out.push_str("</span>");
    }
    out.push_str(WRAPPER_CLOSE);
    out
}

fn host_of(url: &str) -> Option<String> {
    canonicalize(url).ok()?.host_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PreviewRecord {
        PreviewRecord {
            url: "https://example.com/post".into(),
            title: "A Post".into(),
            description: "All about it".into(),
            image_url: "https://cdn.example.com/a.jpg".into(),
        }
    }

    #[test]
    fn test_full_card() {
        let html = render_card(&record(), CardOptions::default());
        assert!(html.starts_with(r#"<div class="link-preview"><a class="link-card" href="https://example.com/post""#));
        assert!(html.contains(r#"<img src="https://cdn.example.com/a.jpg" alt="" loading="lazy" />"#));
        assert!(html.contains(r#"<div class="link-card__title">A Post <span class="link-card__dot">·</span>"#));
        assert!(html.contains(r#"<span class="link-card__host">example.com</span>"#));
        assert!(html.contains(r#"<div class="link-card__desc">All about it</div>"#));
        assert!(html.ends_with("</div></a></div>"));
    }

    #[test]
    fn test_card_without_host_suffix() {
        let html = render_card(&record(), CardOptions { show_host: false });
        assert!(html.contains(r#"<div class="link-card__title">A Post</div>"#));
        assert!(!html.contains("link-card__host"));
    }

    #[test]
    fn test_optional_parts_omitted() {
        let record = PreviewRecord { image_url: String::new(), description: String::new(), ..record() };
        let html = render_card(&record, CardOptions::default());
        assert!(!html.contains("link-card__media"));
        assert!(!html.contains("link-card__desc"));
        assert!(html.contains("link-card__title"));
    }

    #[test]
    fn test_card_escapes_text_and_attributes() {
        let record = PreviewRecord {
            url: r#"https://example.com/?q="><script>"#.into(),
            title: "<b>bold</b> & more".into(),
            description: "<img onerror=x>".into(),
            image_url: "javascript:alert(1)".into(),
        };
        let html = render_card(&record, CardOptions::default());
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt; &amp; more"));
        assert!(!html.contains("<img onerror"));
        assert!(!html.contains("javascript:"));
    }

    #[test]
    fn test_fallback_link() {
        let html = render_fallback("https://example.com/a?b=1&c=2");
        assert_eq!(
            html,
            r#"<div class="link-preview"><a class="link-preview__fallback" href="https://example.com/a?b=1&amp;c=2" target="_blank" rel="noopener noreferrer">https://example.com/a?b=1&amp;c=2</a></div>"#
        );
    }

    #[test]
    fn test_fallback_for_non_web_url() {
        let html = render_fallback("javascript:alert(1)");
        assert!(!html.contains("href"));
        assert!(html.contains("javascript:alert(1)"));
    }

    #[test]
    fn test_fallback_blank_is_empty() {
        assert_eq!(render_fallback("   "), "");
    }

    #[test]
    fn test_render_preview_dispatch() {
        let record = record();
        assert!(render_preview(&record.url, Some(&record), CardOptions::default()).contains("link-card"));
        assert!(render_preview(&record.url, None, CardOptions::default()).contains("link-preview__fallback"));
    }
}
