//! Cache key derivation for preview records and their fetch locks.

use sha2::{Digest, Sha256};

pub const PREVIEW_PREFIX: &str = "preview:";
pub const LOCK_PREFIX: &str = "preview-lock:";

/// Hex SHA-256 of an already-normalized URL.
pub fn url_digest(normalized_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Key under which the preview record for a URL is stored.
pub fn preview_key(normalized_url: &str) -> String {
    format!("{PREVIEW_PREFIX}{}", url_digest(normalized_url))
}

/// Key of the short-lived lock guarding the fetch for a URL.
pub fn lock_key(normalized_url: &str) -> String {
    format!("{LOCK_PREFIX}{}", url_digest(normalized_url))
}
