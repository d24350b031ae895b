//! Catalog references and output records
//!
//! `PageRef` and `ItemRef` flow from pagination into the item queue; the
//! page label travels with every item so diagnostics can name where an item
//! was discovered. `VariantRecord` is the final flat output row.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Product addresses look like `.../p-lightning-bolt-m10-123456`.
    static ref ITEM_SLUG: Regex = Regex::new(r"/p-(.+)-\d+/?$").expect("item slug pattern is valid");
}

/// One listing page of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    /// 1-based page number
    pub number: u32,
    pub url: String,
}

impl PageRef {
    /// Expand a listing template containing `{page}` into `count` ordered pages.
    #[must_use]
    pub fn sequence(template: &str, count: u32) -> Vec<Self> {
        (1..=count)
            .map(|number| Self {
                number,
                url: template.replace("{page}", &number.to_string()),
            })
            .collect()
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}", self.number)
    }
}

/// An item discovered on a listing page (or supplied directly).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub url: String,
    /// Listing page the item was discovered on, `None` for directly supplied items
    pub page: Option<u32>,
}

impl ItemRef {
    #[must_use]
    pub fn new(url: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            url: url.into(),
            page,
        }
    }

    /// Short identifier used in logs and diagnostics.
    ///
    /// Falls back to the full address when the URL does not follow the
    /// `p-<slug>-<digits>` product pattern.
    #[must_use]
    pub fn slug(&self) -> &str {
        ITEM_SLUG
            .captures(&self.url)
            .and_then(|captures| captures.get(1))
            .map_or(self.url.as_str(), |m| m.as_str())
    }

    /// Page label for diagnostics, empty when the item was not paginated.
    #[must_use]
    pub fn page_label(&self) -> String {
        self.page.map(|page| page.to_string()).unwrap_or_default()
    }
}

/// Stock of one variant at the designated location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub variant_id: String,
    pub location: String,
    pub quantity: i64,
}

/// One emitted variant with its live stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRecord {
    pub name: String,
    pub link: String,
    pub set: String,
    pub number: String,
    pub surface: String,
    pub price: f64,
    pub image: String,
    pub stock_quantity: i64,
}
