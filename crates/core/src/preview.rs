//! Preview records as they are stored and served.

use serde::{Deserialize, Serialize};

/// Scraped metadata for one URL.
///
/// Written once by the fetch-lock holder and never mutated; it disappears
/// when its TTL runs out. Empty strings mean the field was not found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PreviewRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
}

impl PreviewRecord {
    pub fn to_json(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty()
    }
}
