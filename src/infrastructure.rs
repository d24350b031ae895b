//! Infrastructure layer for configuration, networking, parsing and output
//!
//! This module provides configuration loading, logging, the resilient HTTP
//! fetcher with identity rotation, HTML parsing for catalog documents, the
//! diagnostics side channel and CSV export.

pub mod config; // Configuration constants and layered loading
pub mod csv_export;
pub mod diagnostics;
pub mod http_client; // Transport seam and resilient fetch
pub mod identity;
pub mod logging; // Logging infrastructure
pub mod parsing; // Catalog parser trait and Magento implementation

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, CrawlConfig, FetchConfig, OutputConfig, SiteConfig};
pub use csv_export::{ExportError, export_to_file, write_records};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Diagnostics, FileDiagnostics, MemoryDiagnostics};
pub use http_client::{
    FetchError, FetchOptions, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ResilientFetcher,
    RetryPolicy, TransportError,
};
pub use identity::{FixedIdentity, IdentityMode, IdentityStrategy, RandomIdentity, RoundRobinIdentity};
pub use logging::{get_log_directory, init_logging_with_config, log_system_info};
pub use parsing::{CatalogParser, MagentoCatalogParser, ParsingError, SelectorConfig};
