//! Per-variant stock lookups against the store inventory endpoint
//!
//! The endpoint answers with a JSON array of stores. Field names differ
//! between shop versions, so both `name`/`qty` and
//! `locationName`/`quantity` are accepted.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::StockRecord;
use crate::infrastructure::config::{FetchConfig, SiteConfig};
use crate::infrastructure::http_client::{FetchError, FetchOptions, ResilientFetcher};

#[derive(Error, Debug)]
pub enum StockError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("inventory response for variant {variant_id} is not a stock list: {source}")]
    InvalidResponse {
        variant_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("location '{location}' missing from inventory of variant {variant_id} (saw: {})", .seen.join(", "))]
    MissingLocation {
        variant_id: String,
        location: String,
        seen: Vec<String>,
    },
}

/// One store entry of the inventory response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreStock {
    #[serde(alias = "locationName")]
    pub name: String,
    #[serde(alias = "quantity")]
    pub qty: i64,
}

/// Validate an inventory body and pick `location`.
pub fn parse_stock_response(body: &str, variant_id: &str, location: &str) -> Result<StockRecord, StockError> {
    let stores: Vec<StoreStock> =
        serde_json::from_str(body).map_err(|source| StockError::InvalidResponse {
            variant_id: variant_id.to_string(),
            source,
        })?;

    match stores.iter().find(|store| store.name == location) {
        Some(store) => Ok(StockRecord {
            variant_id: variant_id.to_string(),
            location: store.name.clone(),
            quantity: store.qty,
        }),
        None => Err(StockError::MissingLocation {
            variant_id: variant_id.to_string(),
            location: location.to_string(),
            seen: stores.into_iter().map(|store| store.name).collect(),
        }),
    }
}

/// Resolves the designated location's stock for variants.
#[derive(Debug, Clone)]
pub struct InventoryClient {
    fetcher: Arc<ResilientFetcher>,
    url_template: String,
    location: String,
    options: FetchOptions,
}

impl InventoryClient {
    pub fn new(
        fetcher: Arc<ResilientFetcher>,
        url_template: impl Into<String>,
        location: impl Into<String>,
        options: FetchOptions,
    ) -> Self {
        Self {
            fetcher,
            url_template: url_template.into(),
            location: location.into(),
            options,
        }
    }

    pub fn from_config(fetcher: Arc<ResilientFetcher>, site: &SiteConfig, fetch: &FetchConfig) -> Self {
        let mut options = FetchOptions::json();
        options.timeout = fetch.inventory_timeout();
        Self::new(
            fetcher,
            site.inventory_url_template.clone(),
            site.stock_location.clone(),
            options,
        )
    }

    #[must_use]
    pub fn inventory_url(&self, variant_id: &str) -> String {
        self.url_template.replace("{id}", variant_id)
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    pub async fn resolve(&self, variant_id: &str) -> Result<StockRecord, StockError> {
        let url = self.inventory_url(variant_id);
        let response = self.fetcher.fetch(&url, &self.options).await?;
        if !response.is_success() {
            debug!(variant_id, status = response.status, "Inventory lookup returned an error status");
        }
        parse_stock_response(response.text(), variant_id, &self.location)
    }
}
