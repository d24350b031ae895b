//! Parsing configuration for HTML extraction
//!
//! CSS selectors and text cleanup rules for the catalog parser.

use serde::{Deserialize, Serialize};

/// CSS selectors used by the catalog parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Links to item pages on a listing page
    pub listing_item_link: String,

    /// Display name on an item page
    pub title: String,

    /// Embedded script payloads that may hold the product configuration
    pub config_script: String,

    /// Image inside a gallery fragment
    pub gallery_image: String,

    /// Fallback link inside a gallery fragment when no image is present
    pub gallery_link: String,

    /// Suffixes stripped from display names, e.g. "(Enkeltkort)"
    pub title_suffixes: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing_item_link: ".product-item-info .product-item-name a[href]".to_string(),
            title: "h1.page-title span".to_string(),
            config_script: r#"script[type="text/x-magento-init"]"#.to_string(),
            gallery_image: "img[src]".to_string(),
            gallery_link: "a[href]".to_string(),
            title_suffixes: vec!["(Enkeltkort)".to_string()],
        }
    }
}
