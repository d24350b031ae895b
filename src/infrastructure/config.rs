//! Configuration infrastructure
//!
//! Contains configuration loading and validation for the stock crawler.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (see [`defaults`])
//! 2. A TOML/JSON file: an explicit path, or `stock-crawler.toml` in the
//!    user config directory when present
//! 3. Environment variables `STOCK_CRAWLER__<SECTION>__<KEY>`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::AttributeRoles;
use crate::infrastructure::identity::IdentityMode;
use crate::infrastructure::parsing::SelectorConfig;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target site addresses and page structure
    pub site: SiteConfig,

    /// Pipeline sizing
    pub crawl: CrawlConfig,

    /// Resilient fetch behavior
    pub fetch: FetchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Output locations
    pub output: OutputConfig,
}

/// Target site settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Base address used to resolve relative item links
    pub base_url: String,

    /// Listing page address; `{page}` is replaced with the 1-based page number
    pub listing_url_template: String,

    /// Inventory endpoint; `{id}` is replaced with the variant id
    pub inventory_url_template: String,

    /// Store whose quantity is reported
    pub stock_location: String,

    /// Fixed `Host` header sent with every request
    pub target_host: Option<String>,

    /// Attribute ids carrying edition, number and surface
    pub attribute_roles: AttributeRoles,

    /// HTML selectors for the catalog parser
    pub selectors: SelectorConfig,
}

/// Pipeline sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Number of listing pages to walk
    pub page_count: u32,

    /// Concurrent listing page fetches
    pub listing_concurrency: usize,

    /// Concurrent item jobs on the work queue
    pub item_concurrency: usize,
}

/// Resilient fetch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Additional attempts after the first transport failure
    pub max_retries: u32,

    /// Linear backoff base: retry `n` waits `n * retry_delay_ms`
    pub retry_delay_ms: u64,

    /// Per-attempt timeout for listing and item pages (0 disables)
    pub page_timeout_ms: u64,

    /// Per-attempt timeout for inventory lookups (0 disables)
    pub inventory_timeout_ms: u64,

    /// TCP connect timeout
    pub connect_timeout_ms: u64,

    pub follow_redirects: bool,

    /// How the user-agent is picked on each attempt
    pub identity: IdentityMode,

    /// User-agent pool; `None` uses the built-in pool
    pub user_agents: Option<Vec<String>>,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

/// Output locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// CSV file with one row per emitted variant
    pub csv_path: PathBuf,

    /// Append-only diagnostics file
    pub diagnostics_path: PathBuf,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            listing_url_template: defaults::LISTING_URL_TEMPLATE.to_string(),
            inventory_url_template: defaults::INVENTORY_URL_TEMPLATE.to_string(),
            stock_location: defaults::STOCK_LOCATION.to_string(),
            target_host: Some(defaults::TARGET_HOST.to_string()),
            attribute_roles: AttributeRoles::default(),
            selectors: SelectorConfig::default(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            page_count: defaults::PAGE_COUNT,
            listing_concurrency: defaults::LISTING_CONCURRENCY,
            item_concurrency: defaults::ITEM_CONCURRENCY,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            page_timeout_ms: defaults::PAGE_TIMEOUT_MS,
            inventory_timeout_ms: defaults::INVENTORY_TIMEOUT_MS,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            follow_redirects: true,
            identity: IdentityMode::default(),
            user_agents: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "warn".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "error".to_string());
                filters.insert("selectors".to_string(), "error".to_string());
                filters
            },
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from(defaults::CSV_PATH),
            diagnostics_path: PathBuf::from(defaults::DIAGNOSTICS_PATH),
        }
    }
}

impl FetchConfig {
    /// Page timeout, `None` when disabled
    #[must_use]
    pub const fn page_timeout(&self) -> Option<std::time::Duration> {
        timeout_from_ms(self.page_timeout_ms)
    }

    /// Inventory timeout, `None` when disabled
    #[must_use]
    pub const fn inventory_timeout(&self) -> Option<std::time::Duration> {
        timeout_from_ms(self.inventory_timeout_ms)
    }
}

const fn timeout_from_ms(ms: u64) -> Option<std::time::Duration> {
    if ms == 0 {
        None
    } else {
        Some(std::time::Duration::from_millis(ms))
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .context("Failed to serialize default configuration")?;
        let mut builder = config::Config::builder().add_source(defaults);

        match path {
            Some(path) => {
                info!("📋 Loading configuration from {}", path.display());
                builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Ok(default_path) = ConfigManager::default_config_path() {
                    if default_path.exists() {
                        info!("📋 Loading configuration from {}", default_path.display());
                    }
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(defaults::ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.crawl.item_concurrency == 0 {
            bail!("crawl.item_concurrency must be at least 1");
        }
        if self.crawl.listing_concurrency == 0 {
            bail!("crawl.listing_concurrency must be at least 1");
        }
        if self.crawl.page_count == 0 {
            bail!("crawl.page_count must be at least 1");
        }
        if !self.site.listing_url_template.contains("{page}") {
            bail!(
                "site.listing_url_template must contain {{page}}: {}",
                self.site.listing_url_template
            );
        }
        if !self.site.inventory_url_template.contains("{id}") {
            bail!(
                "site.inventory_url_template must contain {{id}}: {}",
                self.site.inventory_url_template
            );
        }
        if self.site.stock_location.trim().is_empty() {
            bail!("site.stock_location must not be empty");
        }
        if let Some(pool) = &self.fetch.user_agents {
            if pool.iter().all(|ua| ua.trim().is_empty()) {
                bail!("fetch.user_agents is configured but contains no user-agent");
            }
        }
        url::Url::parse(&self.site.base_url)
            .with_context(|| format!("site.base_url is not a valid URL: {}", self.site.base_url))?;
        Ok(())
    }
}

/// Locates configuration on disk
pub struct ConfigManager;

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Default configuration file location
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME))
    }
}

/// Default configuration values
pub mod defaults {
    /// Directory name under the user config dir
    pub const APP_DIR_NAME: &str = "stock-crawler";

    pub const CONFIG_FILE_NAME: &str = "stock-crawler.toml";

    /// Environment variable prefix
    pub const ENV_PREFIX: &str = "STOCK_CRAWLER";

    // Site
    pub const BASE_URL: &str = "https://www.outland.no";

    pub const LISTING_URL_TEMPLATE: &str = "https://www.outland.no/samlekort-og-kortspill/magic-the-gathering/singles?available=1&p={page}&product_list_limit=100";

    pub const INVENTORY_URL_TEMPLATE: &str =
        "https://www.outland.no/rest/V1/clickandcollect/storesInfo?productId={id}";

    pub const STOCK_LOCATION: &str = "Oslo";

    pub const TARGET_HOST: &str = "www.outland.no";

    // Crawl
    /// Listing pages at 100 items per page
    pub const PAGE_COUNT: u32 = 185;

    pub const LISTING_CONCURRENCY: usize = 5;

    pub const ITEM_CONCURRENCY: usize = 15;

    // Fetch
    /// Default maximum retries after the first attempt
    pub const MAX_RETRIES: u32 = 3;

    /// Default linear backoff base in milliseconds
    pub const RETRY_DELAY_MS: u64 = 1000;

    pub const PAGE_TIMEOUT_MS: u64 = 30_000;

    pub const INVENTORY_TIMEOUT_MS: u64 = 10_000;

    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

    // Logging
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_FILE_NAME: &str = "stock-crawler.log";
    pub const LOG_MAX_FILES: u32 = 7;
    pub const LOG_AUTO_CLEANUP: bool = true;

    // Output
    pub const CSV_PATH: &str = "stock.csv";
    pub const DIAGNOSTICS_PATH: &str = "error.log";
}
