//! # Crawl Orchestrator
//!
//! Drives the four-stage pipeline:
//!
//! 1. **Pagination**: listing pages are fetched through a fixed-width pool
//! 2. **Item discovery**: each completed page enqueues its items on the
//!    bounded item queue right away
//! 3. **Item resolution** and 4. **stock resolution** run inside each item
//!    job (see [`ItemResolver`])
//!
//! Once the item queue reports `finished`, per-item records are flattened in
//! completion order and failed jobs are written to diagnostics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::crawling::inventory::InventoryClient;
use crate::crawling::item_resolver::{ItemError, ItemResolver};
use crate::crawling::work_queue::{JobFailure, JobId, WorkQueue};
use crate::domain::{ItemRef, PageRef, VariantRecord};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::infrastructure::http_client::{
    FetchError, FetchOptions, HttpTransport, ResilientFetcher, RetryPolicy,
};
use crate::infrastructure::identity::IdentityStrategy;
use crate::infrastructure::parsing::{CatalogParser, MagentoCatalogParser};

type ItemQueue = WorkQueue<ItemRef, Vec<VariantRecord>>;

/// Configuration for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Listing page address with a `{page}` placeholder
    pub listing_url_template: String,

    /// Number of listing pages to walk
    pub page_count: u32,

    /// Concurrent listing page fetches
    pub listing_concurrency: usize,

    /// Concurrent item jobs
    pub item_concurrency: usize,
}

impl OrchestratorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            listing_url_template: config.site.listing_url_template.clone(),
            page_count: config.crawl.page_count,
            listing_concurrency: config.crawl.listing_concurrency,
            item_concurrency: config.crawl.item_concurrency,
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    /// Emitted records in item completion order
    pub records: Vec<VariantRecord>,
    pub pages_total: usize,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub items_discovered: usize,
    pub items_resolved: usize,
    pub items_aborted: usize,
    pub items_failed: usize,
    pub variants_emitted: usize,
    pub variants_dropped: usize,
    pub peak_item_concurrency: usize,
    pub diagnostics: usize,
    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn log_summary(&self) {
        info!("📊 Crawl finished in {:.1}s", self.elapsed.as_secs_f64());
        info!(
            "📄 Pages: {} fetched, {} failed (of {})",
            self.pages_fetched, self.pages_failed, self.pages_total
        );
        info!(
            "🎴 Items: {} discovered, {} resolved, {} aborted, {} failed (peak {} concurrent)",
            self.items_discovered,
            self.items_resolved,
            self.items_aborted,
            self.items_failed,
            self.peak_item_concurrency
        );
        info!(
            "✅ Variants: {} emitted, {} dropped; {} diagnostics recorded",
            self.variants_emitted, self.variants_dropped, self.diagnostics
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ListingTally {
    fetched: usize,
    failed: usize,
}

/// Main orchestrator that coordinates the crawl
pub struct CrawlOrchestrator {
    config: OrchestratorConfig,
    fetcher: Arc<ResilientFetcher>,
    parser: Arc<dyn CatalogParser>,
    resolver: Arc<ItemResolver>,
    diagnostics: Diagnostics,
    page_options: FetchOptions,
    /// Held for the length of a run; report counters are per-run deltas
    run_lock: tokio::sync::Mutex<()>,
}

impl CrawlOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        fetcher: Arc<ResilientFetcher>,
        parser: Arc<dyn CatalogParser>,
        resolver: Arc<ItemResolver>,
        diagnostics: Diagnostics,
        page_options: FetchOptions,
    ) -> Self {
        Self {
            config,
            fetcher,
            parser,
            resolver,
            diagnostics,
            page_options,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Wire the default pipeline for `config` over `transport`.
    pub fn from_config(
        config: &AppConfig,
        transport: Arc<dyn HttpTransport>,
        diagnostics: Diagnostics,
    ) -> anyhow::Result<Self> {
        let pool = config.fetch.user_agents.clone().unwrap_or_default();
        let identity: Arc<dyn IdentityStrategy> = Arc::from(config.fetch.identity.build(pool));

        let mut fetcher = ResilientFetcher::new(transport, identity, RetryPolicy::from_config(&config.fetch));
        if let Some(host) = &config.site.target_host {
            fetcher = fetcher.with_target_host(host.clone()).with_context_label(host);
        }
        let fetcher = Arc::new(fetcher);

        let parser: Arc<dyn CatalogParser> = Arc::new(
            MagentoCatalogParser::new(&config.site.selectors, &config.site.base_url)
                .context("Failed to build the catalog parser")?,
        );
        let page_options = FetchOptions {
            timeout: config.fetch.page_timeout(),
            headers: Vec::new(),
        };
        let inventory = InventoryClient::from_config(Arc::clone(&fetcher), &config.site, &config.fetch);
        let resolver = Arc::new(ItemResolver::new(
            Arc::clone(&fetcher),
            Arc::clone(&parser),
            inventory,
            config.site.attribute_roles.clone(),
            diagnostics.clone(),
            page_options.clone(),
        ));

        Ok(Self::new(
            OrchestratorConfig::from_app_config(config),
            fetcher,
            parser,
            resolver,
            diagnostics,
            page_options,
        ))
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the full pipeline starting from the listing pages.
    ///
    /// Runs on one orchestrator are serialized: a second call waits for the
    /// first to finish.
    pub async fn run(&self) -> CrawlReport {
        let _exclusive = self.run_lock.lock().await;
        let pages = PageRef::sequence(&self.config.listing_url_template, self.config.page_count);
        info!(
            "🚀 Starting crawl: {} listing pages ({} concurrent), {} concurrent items",
            pages.len(),
            self.config.listing_concurrency,
            self.config.item_concurrency
        );

        let started = Instant::now();
        let baseline = Baseline::capture(self);
        let queue = self.item_queue();
        let mut jobs = HashMap::new();

        let pages_total = pages.len();
        let tally = self.discover(pages, &queue, &mut jobs).await;
        info!(
            "🔄 Pagination done: {} items queued from {} pages",
            jobs.len(),
            tally.fetched
        );

        let mut report = self.collect(&queue, &jobs, baseline).await;
        report.pages_total = pages_total;
        report.pages_fetched = tally.fetched;
        report.pages_failed = tally.failed;
        report.elapsed = started.elapsed();
        report
    }

    /// Resolve specific items, skipping pagination.
    pub async fn run_items(&self, items: Vec<ItemRef>) -> CrawlReport {
        let _exclusive = self.run_lock.lock().await;
        info!("🚀 Resolving {} items directly", items.len());
        let started = Instant::now();
        let baseline = Baseline::capture(self);
        let queue = self.item_queue();

        let jobs: HashMap<JobId, ItemRef> = items
            .into_iter()
            .map(|item| (queue.enqueue(item.clone()), item))
            .collect();

        let mut report = self.collect(&queue, &jobs, baseline).await;
        report.elapsed = started.elapsed();
        report
    }

    fn item_queue(&self) -> ItemQueue {
        let resolver = Arc::clone(&self.resolver);
        WorkQueue::new("items", self.config.item_concurrency, move |item: ItemRef| {
            let resolver = Arc::clone(&resolver);
            async move { resolver.resolve(item).await.map_err(anyhow::Error::from) }
        })
    }

    /// Stages 1 and 2: walk listing pages and enqueue items as pages complete.
    async fn discover(
        &self,
        pages: Vec<PageRef>,
        queue: &ItemQueue,
        jobs: &mut HashMap<JobId, ItemRef>,
    ) -> ListingTally {
        let mut tally = ListingTally::default();
        let mut listings = stream::iter(pages)
            .map(|page| async move {
                let result = self.fetch_listing(&page).await;
                (page, result)
            })
            .buffer_unordered(self.config.listing_concurrency.max(1));

        while let Some((page, result)) = listings.next().await {
            match result {
                Ok(items) => {
                    tally.fetched += 1;
                    debug!(page = page.number, items = items.len(), "Listing page parsed");
                    for item in items {
                        jobs.insert(queue.enqueue(item.clone()), item);
                    }
                }
                Err(error) => {
                    tally.failed += 1;
                    self.diagnostics.report(
                        Diagnostic::for_page(DiagnosticKind::ListingFetchFailed, &page)
                            .with_detail(error.to_string()),
                    );
                }
            }
        }

        tally
    }

    async fn fetch_listing(&self, page: &PageRef) -> Result<Vec<ItemRef>, FetchError> {
        info!("Scraping products page '{}'...", page.number);
        let response = self.fetcher.fetch(&page.url, &self.page_options).await?;
        if !response.is_success() {
            warn!(page = page.number, status = response.status, "Listing page returned an error status");
        }
        Ok(self.parser.listing_items(response.text(), page))
    }

    /// Aggregation: wait for the queue, flatten results, report failures.
    async fn collect(
        &self,
        queue: &ItemQueue,
        jobs: &HashMap<JobId, ItemRef>,
        baseline: Baseline,
    ) -> CrawlReport {
        queue.finished().await;
        let stats = queue.stats();
        let outcome = queue.take_report();

        for failure in &outcome.failures {
            self.report_failure(failure, jobs.get(&failure.job_id()));
        }

        let resolution = self.resolver.stats().snapshot().since(&baseline.resolution);
        CrawlReport {
            records: outcome.results.into_iter().flatten().collect(),
            items_discovered: jobs.len(),
            items_resolved: resolution.items_resolved,
            items_aborted: resolution.items_aborted,
            items_failed: outcome.failures.len(),
            variants_emitted: resolution.variants_emitted,
            variants_dropped: resolution.variants_dropped,
            peak_item_concurrency: stats.peak_running,
            diagnostics: self.diagnostics.count().saturating_sub(baseline.diagnostics),
            ..CrawlReport::default()
        }
    }

    fn report_failure(&self, failure: &JobFailure, item: Option<&ItemRef>) {
        let kind = match failure {
            JobFailure::Failed { error, .. } if error.downcast_ref::<ItemError>().is_some() => {
                DiagnosticKind::ItemFetchFailed
            }
            _ => DiagnosticKind::JobFailed,
        };
        let diagnostic = match item {
            Some(item) => Diagnostic::for_item(kind, item),
            None => Diagnostic::new(kind, format!("job {}", failure.job_id())),
        };
        self.diagnostics.report(diagnostic.with_detail(failure.to_string()));
    }
}

/// Counter values at the start of a run
struct Baseline {
    resolution: crate::crawling::item_resolver::ResolutionSnapshot,
    diagnostics: usize,
}

impl Baseline {
    fn capture(orchestrator: &CrawlOrchestrator) -> Self {
        Self {
            resolution: orchestrator.resolver.stats().snapshot(),
            diagnostics: orchestrator.diagnostics.count(),
        }
    }
}
