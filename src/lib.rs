//! Stock Crawler - catalog crawling with per-variant stock resolution
//!
//! Walks the paginated listing of a configurable-product catalog, decodes the
//! embedded product configuration of every item, expands it into purchasable
//! variants and resolves the live store stock of each variant.
//!
//! The crate is layered the same way as its binary uses it:
//! - [`domain`]: catalog references, the product configuration payload and the
//!   pure variant expansion over it
//! - [`infrastructure`]: configuration, logging, the resilient HTTP fetcher,
//!   identity rotation, HTML parsing, diagnostics and CSV export
//! - [`crawling`]: the bounded work queue and the crawl orchestrator that
//!   composes everything into the four-stage pipeline

// Module declarations
pub mod crawling;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export the pipeline entry points for easier access
pub use crawling::orchestrator::{CrawlOrchestrator, CrawlReport};
pub use crawling::work_queue::{JobFailure, JobOutcome, QueueReport, QueueStats, WorkQueue};
pub use domain::{ItemRef, PageRef, VariantRecord};
pub use infrastructure::config::AppConfig;
pub use infrastructure::http_client::{FetchOptions, ResilientFetcher, RetryPolicy};
