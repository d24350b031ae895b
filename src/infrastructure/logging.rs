//! Logging system configuration and initialization
//!
//! This module provides the logging setup for the crawler:
//! - Console and file output, either of which may be disabled
//! - Level control from configuration, overridden by `RUST_LOG`
//! - Structured JSON file logs (optional)
//! - The previous run's log file is rotated to a timestamped name
//! - Old rotated logs are cleaned up down to `max_files`

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::non_blocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::Directive,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

// Re-export LoggingConfig from config module
pub use crate::infrastructure::config::LoggingConfig;

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Local wall-clock timestamps with millisecond precision
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Log directory for `config`: the configured one or the default
pub fn resolve_log_directory(config: &LoggingConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(get_log_directory)
}

/// Rotate the previous run's log file by renaming it with its timestamp
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<Option<PathBuf>> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(None);
    }

    let metadata = std::fs::metadata(&log_file_path)
        .map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let datetime: DateTime<Local> = file_time.into();

    let file_stem = log_file_name.trim_end_matches(".log");
    let timestamped_name = format!("{}.{}.log", file_stem, datetime.format("%Y%m%dT%H%M%S"));
    let timestamped_path = log_dir.join(&timestamped_name);

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;

    Ok(Some(timestamped_path))
}

/// Open `directory/file_name` for appending, without rotation.
pub(crate) fn open_appender(directory: &Path, file_name: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .with_context(|| {
            format!(
                "Failed to open {} for appending",
                directory.join(file_name).display()
            )
        })
}

/// Initialize logging with custom configuration
///
/// `RUST_LOG` takes precedence over the configured level and module filters:
/// ```bash
/// # Show HTTP client internals
/// RUST_LOG="debug,reqwest=debug,hyper=debug" stock-crawler
///
/// # Only the pipeline, nothing from dependencies
/// RUST_LOG="warn,stock_crawler_lib=info" stock-crawler
/// ```
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let log_dir = resolve_log_directory(config);
    let mut rotated = None;
    let mut removed = 0;

    let file_writer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        rotated = rotate_existing_log_file(&log_dir, &config.file_name)?;
        if config.auto_cleanup_logs {
            removed = cleanup_old_logs(&log_dir, config)?;
        }

        let file_appender = open_appender(&log_dir, &config.file_name)?;
        let (file_writer, file_guard) = non_blocking(file_appender);

        // Store the guard globally to prevent it from being dropped
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(file_guard);
        }
        Some(file_writer)
    } else {
        None
    };

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(config)?,
    };

    let file_layer = file_writer.map(|writer| {
        if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .boxed()
        } else {
            // time + level + message + span fields
            fmt::Layer::new()
                .with_writer(writer)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        }
    });

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    });

    Registry::default()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install the global tracing subscriber")?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log file: {}", log_dir.join(&config.file_name).display());
        info!("JSON format: {}", config.json_format);
    }
    if let Some(path) = rotated {
        info!("Rotated previous log file to: {}", path.display());
    }
    if removed > 0 {
        info!("Removed {} old log files (keeping {})", removed, config.max_files);
    }

    Ok(())
}

/// Base level plus per-module directives
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    // dependency noise stays suppressed unless TRACE is requested
    if !config.level.to_lowercase().contains("trace") {
        let mut modules: Vec<_> = config.module_filters.iter().collect();
        modules.sort();
        for (module, level) in modules {
            let directive: Directive = format!("{}={}", module, level)
                .parse()
                .with_context(|| format!("Invalid log filter '{}={}'", module, level))?;
            filter = filter.add_directive(directive);
        }
    }

    Ok(filter)
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Stock Crawler System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("========================================");
}

/// Remove rotated log files beyond `max_files`, newest kept.
///
/// Only files sharing the configured log file's stem are considered.
fn cleanup_old_logs(log_dir: &Path, config: &LoggingConfig) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let stem = config.file_name.trim_end_matches(".log");
    let mut log_files = Vec::new();

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_rotated_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(stem) && name.ends_with(".log"));

        if path.is_file() && is_rotated_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // Sort by modification time (newest first)
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(config.max_files as usize) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn config_in(dir: &Path) -> LoggingConfig {
        LoggingConfig {
            log_dir: Some(dir.to_path_buf()),
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.level.is_empty());
        assert!(config.console_output);
        assert!(config.file_output);
        assert_eq!(resolve_log_directory(&config), get_log_directory());
    }

    #[test]
    fn test_log_directory_creation() {
        let log_dir = get_log_directory();
        assert!(log_dir.to_string_lossy().ends_with("logs"));
    }

    #[test]
    fn previous_log_is_rotated_to_a_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stock-crawler.log"), "previous run").unwrap();

        let rotated = rotate_existing_log_file(dir.path(), "stock-crawler.log")
            .unwrap()
            .unwrap();

        assert!(!dir.path().join("stock-crawler.log").exists());
        let name = rotated.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("stock-crawler.") && name.ends_with(".log"));
        assert_eq!(std::fs::read_to_string(rotated).unwrap(), "previous run");
    }

    #[test]
    fn nothing_to_rotate_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        assert!(rotate_existing_log_file(dir.path(), "stock-crawler.log").unwrap().is_none());
    }

    #[test]
    fn cleanup_keeps_the_newest_files_of_this_log_only() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for age in 0..5u64 {
            let path = dir.path().join(format!("stock-crawler.2024010{}T000000.log", age));
            std::fs::write(&path, "old").unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(now - Duration::from_secs(age * 60)).unwrap();
        }
        std::fs::write(dir.path().join("error.log"), "diagnostics").unwrap();

        let config = LoggingConfig {
            max_files: 2,
            ..config_in(dir.path())
        };
        assert_eq!(cleanup_old_logs(dir.path(), &config).unwrap(), 3);

        assert!(dir.path().join("stock-crawler.20240100T000000.log").exists());
        assert!(dir.path().join("stock-crawler.20240101T000000.log").exists());
        assert!(!dir.path().join("stock-crawler.20240104T000000.log").exists());
        assert!(dir.path().join("error.log").exists());
    }

    #[test]
    fn module_filters_build_into_directives() {
        let config = LoggingConfig::default();
        assert!(build_filter(&config).is_ok());

        let mut broken = LoggingConfig::default();
        broken.module_filters.insert("reqwest".to_string(), "loud".to_string());
        assert!(build_filter(&broken).is_err());
    }

    #[test]
    fn appender_opens_plain_file_name() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_appender(dir.path(), "stock-crawler.log").is_ok());
        assert!(dir.path().join("stock-crawler.log").is_file());
    }

    #[test]
    fn appender_over_a_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("stock-crawler.log")).unwrap();

        let err = open_appender(dir.path(), "stock-crawler.log").unwrap_err();
        assert!(err.to_string().contains("stock-crawler.log"));
    }

    #[test]
    fn disabled_outputs_are_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }
}
