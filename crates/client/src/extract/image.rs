//! Image reference resolution against the page a preview was scraped from.

use url::Url;

/// Resolve an image reference from a meta tag into an absolute http(s) URL.
///
/// - `//host/x.jpg` takes the page's scheme
/// - `/x.jpg` takes the page's scheme, host and port
/// - absolute http(s) URLs pass through
/// - other relative references are joined against the page URL
///
/// Returns `None` for empty values and for any scheme other than http(s)
/// (`data:`, `javascript:`, ...), which must never reach an `<img src>`.
pub fn resolve_image_url(raw: &str, page_url: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let resolved = if let Some(rest) = raw.strip_prefix("//") {
        Url::parse(&format!("{}://{}", page_url.scheme(), rest)).ok()?
    } else {
        match Url::parse(raw) {
            Ok(absolute) => absolute,
            Err(url::ParseError::RelativeUrlWithoutBase) => page_url.join(raw).ok()?,
            Err(_) => return None,
        }
    };

    match resolved.scheme() {
        "http" | "https" if resolved.host_str().is_some() => Some(resolved.to_string()),
        _ => None,
    }
}
