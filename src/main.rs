//! Stock Crawler command line entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use stock_crawler_lib::infrastructure::{
    AppConfig, Diagnostics, FileDiagnostics, ReqwestTransport, export_to_file, init_logging_with_config,
    log_system_info,
};
use stock_crawler_lib::{CrawlOrchestrator, ItemRef};

#[derive(Parser, Debug)]
#[command(name = "stock-crawler", version, about = "Crawl a product catalog and export per-variant store stock")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "STOCK_CRAWLER_CONFIG")]
    config: Option<PathBuf>,

    /// Number of listing pages to crawl
    #[arg(long)]
    pages: Option<u32>,

    /// CSV output path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum number of items resolved concurrently
    #[arg(long)]
    item_concurrency: Option<usize>,

    /// Resolve only this item page (repeatable); pagination is skipped
    #[arg(long = "item", value_name = "URL")]
    items: Vec<String>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(pages) = self.pages {
            config.crawl.page_count = pages;
        }
        if let Some(output) = &self.output {
            config.output.csv_path = output.clone();
        }
        if let Some(concurrency) = self.item_concurrency {
            config.crawl.item_concurrency = concurrency;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    init_logging_with_config(&config.logging)?;
    log_system_info();

    if let Err(e) = run(&cli, &config).await {
        error!("❌ Crawl failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(cli: &Cli, config: &AppConfig) -> Result<()> {
    let transport = Arc::new(ReqwestTransport::new(&config.fetch)?);
    let sink = Arc::new(
        FileDiagnostics::create(&config.output.diagnostics_path)
            .context("Failed to open the diagnostics file")?,
    );
    let diagnostics = Diagnostics::new(sink.clone());
    let orchestrator = CrawlOrchestrator::from_config(config, transport, diagnostics)?;

    let report = if cli.items.is_empty() {
        orchestrator.run().await
    } else {
        let items = cli.items.iter().map(|url| ItemRef::new(url.as_str(), None)).collect();
        orchestrator.run_items(items).await
    };

    let written = export_to_file(&config.output.csv_path, &report.records)
        .with_context(|| format!("Failed to write {}", config.output.csv_path.display()))?;
    info!("💾 Wrote {} records to {}", written, config.output.csv_path.display());

    report.log_summary();
    if report.diagnostics > 0 {
        warn!(
            "⚠️ {} diagnostics written to {}",
            report.diagnostics,
            config.output.diagnostics_path.display()
        );
    }

    sink.close();
    Ok(())
}
