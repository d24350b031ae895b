//! Item resolution: one item page in, zero or more variant records out
//!
//! ```text
//! Fetching -> ParsingConfig -> Aborted(no config) | Aborted(no name) | Expanding
//! Expanding -> per variant: Dropped(attributes/price) | FetchingStock
//! FetchingStock -> Dropped(invalid response/missing location) | Emitted
//! ```
//!
//! Structural problems abort the item with a diagnostic and an empty result;
//! only an exhausted item fetch is returned as an error, for the caller to
//! record as a failed job.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span};

use crate::crawling::inventory::{InventoryClient, StockError};
use crate::domain::{AttributeRoles, ItemRef, ProductConfig, Variant, VariantRecord, expand_variants};
use crate::infrastructure::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::infrastructure::http_client::{FetchError, FetchOptions, ResilientFetcher};
use crate::infrastructure::parsing::CatalogParser;

#[derive(Error, Debug)]
pub enum ItemError {
    #[error("failed to fetch item page: {0}")]
    Fetch(#[from] FetchError),
}

/// Counters shared by every item job of a run
#[derive(Debug, Default)]
pub struct ResolutionStats {
    items_resolved: AtomicUsize,
    items_aborted: AtomicUsize,
    variants_emitted: AtomicUsize,
    variants_dropped: AtomicUsize,
}

/// Plain copy of [`ResolutionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionSnapshot {
    pub items_resolved: usize,
    pub items_aborted: usize,
    pub variants_emitted: usize,
    pub variants_dropped: usize,
}

impl ResolutionSnapshot {
    /// Counts accumulated after `earlier` was taken
    #[must_use]
    pub const fn since(&self, earlier: &Self) -> Self {
        Self {
            items_resolved: self.items_resolved.saturating_sub(earlier.items_resolved),
            items_aborted: self.items_aborted.saturating_sub(earlier.items_aborted),
            variants_emitted: self.variants_emitted.saturating_sub(earlier.variants_emitted),
            variants_dropped: self.variants_dropped.saturating_sub(earlier.variants_dropped),
        }
    }
}

impl ResolutionStats {
    #[must_use]
    pub fn snapshot(&self) -> ResolutionSnapshot {
        ResolutionSnapshot {
            items_resolved: self.items_resolved.load(Ordering::Relaxed),
            items_aborted: self.items_aborted.load(Ordering::Relaxed),
            variants_emitted: self.variants_emitted.load(Ordering::Relaxed),
            variants_dropped: self.variants_dropped.load(Ordering::Relaxed),
        }
    }

    fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Parsed item page: configuration and display name.
struct ItemDocument {
    config: ProductConfig,
    name: String,
}

pub struct ItemResolver {
    fetcher: Arc<ResilientFetcher>,
    parser: Arc<dyn CatalogParser>,
    inventory: InventoryClient,
    roles: AttributeRoles,
    diagnostics: Diagnostics,
    page_options: FetchOptions,
    stats: ResolutionStats,
}

impl ItemResolver {
    pub fn new(
        fetcher: Arc<ResilientFetcher>,
        parser: Arc<dyn CatalogParser>,
        inventory: InventoryClient,
        roles: AttributeRoles,
        diagnostics: Diagnostics,
        page_options: FetchOptions,
    ) -> Self {
        Self {
            fetcher,
            parser,
            inventory,
            roles,
            diagnostics,
            page_options,
            stats: ResolutionStats::default(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> &ResolutionStats {
        &self.stats
    }

    /// Resolve every purchasable variant of `item` with its stock.
    pub async fn resolve(&self, item: ItemRef) -> Result<Vec<VariantRecord>, ItemError> {
        let span = info_span!("item", item = %item.slug(), page = %item.page_label());
        self.resolve_item(&item).instrument(span).await
    }

    async fn resolve_item(&self, item: &ItemRef) -> Result<Vec<VariantRecord>, ItemError> {
        match item.page {
            Some(page) => info!("Scraping product '{}' (page {})...", item.slug(), page),
            None => info!("Scraping product '{}'...", item.slug()),
        }

        let response = self.fetcher.fetch(&item.url, &self.page_options).await?;
        if !response.is_success() {
            debug!(status = response.status, "Item page returned an error status");
        }

        let Some(document) = self.parse_document(item, response.text()) else {
            ResolutionStats::add(&self.stats.items_aborted, 1);
            return Ok(Vec::new());
        };

        let expansion = expand_variants(&document.config, &self.roles);
        ResolutionStats::add(&self.stats.variants_dropped, expansion.dropped.len());
        for dropped in &expansion.dropped {
            self.diagnostics.report(Diagnostic::for_dropped(item, dropped));
        }

        let lookups = expansion
            .variants
            .into_iter()
            .map(|variant| self.complete_variant(item, &document.name, variant));
        let records: Vec<VariantRecord> = join_all(lookups).await.into_iter().flatten().collect();

        ResolutionStats::add(&self.stats.items_resolved, 1);
        ResolutionStats::add(&self.stats.variants_emitted, records.len());
        debug!(variants = records.len(), "Item resolved");
        Ok(records)
    }

    /// Configuration and name, or `None` after reporting why the item aborts.
    fn parse_document(&self, item: &ItemRef, html: &str) -> Option<ItemDocument> {
        let candidates = self.parser.configuration_candidates(html);
        let Some(config) = ProductConfig::find_in(candidates.iter().map(String::as_str)) else {
            self.diagnostics.report(
                Diagnostic::for_item(DiagnosticKind::NoConfiguration, item).with_detail(format!(
                    "none of {} script payloads is a product configuration",
                    candidates.len()
                )),
            );
            return None;
        };

        let Some(name) = self.parser.display_name(html) else {
            self.diagnostics.report(
                Diagnostic::for_item(DiagnosticKind::NoDisplayName, item)
                    .with_detail("item page has no display name"),
            );
            return None;
        };

        Some(ItemDocument { config, name })
    }

    async fn complete_variant(&self, item: &ItemRef, name: &str, variant: Variant) -> Option<VariantRecord> {
        let stock = match self.inventory.resolve(&variant.variant_id).await {
            Ok(stock) => stock,
            Err(error) => {
                let kind = match &error {
                    StockError::Fetch(_) => DiagnosticKind::StockFetchFailed,
                    StockError::InvalidResponse { .. } => DiagnosticKind::InvalidStockResponse,
                    StockError::MissingLocation { .. } => DiagnosticKind::MissingLocation,
                };
                ResolutionStats::add(&self.stats.variants_dropped, 1);
                self.diagnostics.report(
                    Diagnostic::for_item(kind, item)
                        .with_variant(&variant.variant_id)
                        .with_detail(error.to_string()),
                );
                return None;
            }
        };

        let image = variant
            .gallery_fragment
            .as_deref()
            .and_then(|fragment| self.parser.gallery_image(fragment))
            .unwrap_or_default();

        Some(VariantRecord {
            name: name.to_string(),
            link: item.url.clone(),
            set: variant.edition,
            number: variant.number,
            surface: variant.surface,
            price: variant.price,
            image,
            stock_quantity: stock.quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::diagnostics::MemoryDiagnostics;
    use crate::infrastructure::identity::FixedIdentity;
    use crate::infrastructure::http_client::RetryPolicy;
    use crate::infrastructure::parsing::{MagentoCatalogParser, SelectorConfig};
    use crate::test_utils::{RoutedTransport, item_page, product_payload, stock_body};
    use std::time::Duration;

    const ITEM: &str = "https://shop.test/p-lightning-bolt-m10-1";

    fn stock_url(id: &str) -> String {
        format!("https://shop.test/stock?productId={id}")
    }

    fn resolver(transport: RoutedTransport) -> (ItemResolver, Arc<MemoryDiagnostics>) {
        let fetcher = Arc::new(ResilientFetcher::new(
            Arc::new(transport),
            Arc::new(FixedIdentity::new("test-agent")),
            RetryPolicy {
                max_retries: 1,
                retry_delay: Duration::from_millis(10),
            },
        ));
        let memory = Arc::new(MemoryDiagnostics::new());
        let diagnostics = Diagnostics::new(memory.clone());
        let parser = Arc::new(MagentoCatalogParser::new(&SelectorConfig::default(), "https://shop.test").unwrap());
        let inventory = InventoryClient::new(
            fetcher.clone(),
            "https://shop.test/stock?productId={id}",
            "Oslo",
            FetchOptions::json(),
        );
        let resolver = ItemResolver::new(
            fetcher,
            parser,
            inventory,
            AttributeRoles::default(),
            diagnostics,
            FetchOptions::default(),
        );
        (resolver, memory)
    }

    #[tokio::test]
    async fn emits_complete_variants_and_drops_the_rest() {
        let payload = product_payload(&["1001", "1002", "1003"]);
        let transport = RoutedTransport::default()
            .route(ITEM, 200, item_page("Lightning Bolt (Enkeltkort)", Some(&payload)))
            .route(&stock_url("1001"), 200, stock_body(&[("Oslo", 7)]))
            .route(&stock_url("1002"), 200, stock_body(&[("Bergen", 3)]));
        let (resolver, memory) = resolver(transport);

        let records = resolver.resolve(ItemRef::new(ITEM, Some(2))).await.unwrap();

        assert_eq!(
            records,
            vec![VariantRecord {
                name: "Lightning Bolt".to_string(),
                link: ITEM.to_string(),
                set: "Magic 2010".to_string(),
                number: "146".to_string(),
                surface: "Non-foil".to_string(),
                price: 12.5,
                image: "https://cdn.shop.test/1001.jpg".to_string(),
                stock_quantity: 7,
            }]
        );
        assert_eq!(
            memory.kinds(),
            vec![DiagnosticKind::MissingAttribute, DiagnosticKind::MissingLocation]
        );
        let missing = &memory.entries()[1];
        assert_eq!(missing.variant_id.as_deref(), Some("1002"));
        assert_eq!(missing.page, Some(2));

        let stats = resolver.stats().snapshot();
        assert_eq!(stats.items_resolved, 1);
        assert_eq!(stats.variants_emitted, 1);
        assert_eq!(stats.variants_dropped, 2);
    }

    #[tokio::test]
    async fn page_without_configuration_aborts_with_empty_result() {
        let transport = RoutedTransport::default().route(ITEM, 200, item_page("Lightning Bolt", None));
        let (resolver, memory) = resolver(transport);

        let records = resolver.resolve(ItemRef::new(ITEM, Some(1))).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(memory.kinds(), vec![DiagnosticKind::NoConfiguration]);
        assert_eq!(resolver.stats().snapshot().items_aborted, 1);
    }

    #[tokio::test]
    async fn page_without_name_aborts_with_empty_result() {
        let payload = product_payload(&["1001"]);
        let transport = RoutedTransport::default().route(ITEM, 200, item_page("   ", Some(&payload)));
        let (resolver, memory) = resolver(transport);

        assert!(resolver.resolve(ItemRef::new(ITEM, None)).await.unwrap().is_empty());
        assert_eq!(memory.kinds(), vec![DiagnosticKind::NoDisplayName]);
    }

    #[tokio::test]
    async fn zero_salable_variants_is_an_empty_result_without_lookups() {
        let payload = product_payload(&[]);
        let transport = RoutedTransport::default().route(ITEM, 200, item_page("Lightning Bolt", Some(&payload)));
        let (resolver, memory) = resolver(transport);

        assert!(resolver.resolve(ItemRef::new(ITEM, None)).await.unwrap().is_empty());
        assert!(memory.entries().is_empty());
        assert_eq!(resolver.stats().snapshot().items_resolved, 1);
    }

    #[tokio::test]
    async fn invalid_stock_response_drops_the_variant() {
        let payload = product_payload(&["1001"]);
        let transport = RoutedTransport::default()
            .route(ITEM, 200, item_page("Lightning Bolt", Some(&payload)))
            .route(&stock_url("1001"), 500, "<html>error</html>");
        let (resolver, memory) = resolver(transport);

        assert!(resolver.resolve(ItemRef::new(ITEM, None)).await.unwrap().is_empty());
        assert_eq!(memory.kinds(), vec![DiagnosticKind::InvalidStockResponse]);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_item_page_is_an_error() {
        let transport = RoutedTransport::default().fail(ITEM);
        let (resolver, memory) = resolver(transport);

        let error = resolver.resolve(ItemRef::new(ITEM, Some(3))).await.unwrap_err();

        assert!(matches!(error, ItemError::Fetch(FetchError::Exhausted { attempts: 2, .. })));
        assert!(memory.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_inventory_is_a_stock_fetch_failure() {
        let payload = product_payload(&["1001"]);
        let transport = RoutedTransport::default()
            .route(ITEM, 200, item_page("Lightning Bolt", Some(&payload)))
            .fail(&stock_url("1001"));
        let (resolver, memory) = resolver(transport);

        assert!(resolver.resolve(ItemRef::new(ITEM, None)).await.unwrap().is_empty());
        assert_eq!(memory.kinds(), vec![DiagnosticKind::StockFetchFailed]);
    }
}
