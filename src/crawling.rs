//! # Crawling pipeline
//!
//! - [`work_queue`]: bounded async job queue with an idle signal
//! - [`inventory`]: per-variant store stock lookups
//! - [`item_resolver`]: item page to variant records
//! - [`orchestrator`]: pagination, discovery and aggregation

pub mod inventory;
pub mod item_resolver;
pub mod orchestrator;
pub mod work_queue;

pub use inventory::{InventoryClient, StockError, parse_stock_response};
pub use item_resolver::{ItemError, ItemResolver, ResolutionSnapshot, ResolutionStats};
pub use orchestrator::{CrawlOrchestrator, CrawlReport, OrchestratorConfig};
pub use work_queue::{JobFailure, JobId, JobOutcome, QueueReport, QueueStats, WorkQueue};
