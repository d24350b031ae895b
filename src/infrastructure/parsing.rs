//! HTML parsing for catalog documents
//!
//! The crawl core never touches the DOM directly; it asks a [`CatalogParser`]
//! for item links, display names, candidate configuration payloads and
//! gallery images. [`MagentoCatalogParser`] is the implementation for the
//! target shop.

pub mod config;
pub mod error;
pub mod magento_parser;

// Re-export public types
pub use config::SelectorConfig;
pub use error::{ParsingError, ParsingResult};
pub use magento_parser::MagentoCatalogParser;

use crate::domain::{ItemRef, PageRef};

/// Site-specific extraction used by the crawl pipeline.
///
/// Implementations must be cheap to share across tasks; documents are parsed
/// inside each call and never held across an await point.
pub trait CatalogParser: Send + Sync {
    /// Item links on a listing page, tagged with the page they came from.
    fn listing_items(&self, html: &str, page: &PageRef) -> Vec<ItemRef>;

    /// Cleaned display name of an item, `None` when absent or empty.
    fn display_name(&self, html: &str) -> Option<String>;

    /// Raw text of every script payload that may hold the configuration.
    fn configuration_candidates(&self, html: &str) -> Vec<String>;

    /// Image address inside a gallery HTML fragment.
    fn gallery_image(&self, fragment: &str) -> Option<String>;
}
