//! Diagnostics side channel
//!
//! Every skip, drop and abort in the pipeline is reported as one
//! [`Diagnostic`]. Recording never fails and never blocks the caller: the
//! file sink hands lines to a background writer thread.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

use crate::domain::{DroppedVariant, ItemRef, PageRef, VariantDrop};
use crate::infrastructure::logging::open_appender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    ListingFetchFailed,
    ItemFetchFailed,
    NoConfiguration,
    NoDisplayName,
    NoIndexEntry,
    MissingAttribute,
    MissingPrice,
    StockFetchFailed,
    InvalidStockResponse,
    MissingLocation,
    JobFailed,
}

impl DiagnosticKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListingFetchFailed => "listing_fetch_failed",
            Self::ItemFetchFailed => "item_fetch_failed",
            Self::NoConfiguration => "no_configuration",
            Self::NoDisplayName => "no_display_name",
            Self::NoIndexEntry => "no_index_entry",
            Self::MissingAttribute => "missing_attribute",
            Self::MissingPrice => "missing_price",
            Self::StockFetchFailed => "stock_fetch_failed",
            Self::InvalidStockResponse => "invalid_stock_response",
            Self::MissingLocation => "missing_location",
            Self::JobFailed => "job_failed",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&VariantDrop> for DiagnosticKind {
    fn from(reason: &VariantDrop) -> Self {
        match reason {
            VariantDrop::NoIndexEntry => Self::NoIndexEntry,
            VariantDrop::MissingAttribute { .. } => Self::MissingAttribute,
            VariantDrop::MissingPrice => Self::MissingPrice,
        }
    }
}

/// One skip/abort event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub at: DateTime<Local>,
    pub kind: DiagnosticKind,
    /// Item slug or listing page address
    pub subject: String,
    pub page: Option<u32>,
    pub variant_id: Option<String>,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            kind,
            subject: subject.into(),
            page: None,
            variant_id: None,
            detail: String::new(),
        }
    }

    /// Event concerning an item
    pub fn for_item(kind: DiagnosticKind, item: &ItemRef) -> Self {
        Self {
            page: item.page,
            ..Self::new(kind, item.slug())
        }
    }

    /// Event concerning a listing page
    pub fn for_page(kind: DiagnosticKind, page: &PageRef) -> Self {
        Self {
            page: Some(page.number),
            ..Self::new(kind, page.url.clone())
        }
    }

    /// Dropped variant of an item
    pub fn for_dropped(item: &ItemRef, dropped: &DroppedVariant) -> Self {
        Self::for_item(DiagnosticKind::from(&dropped.reason), item)
            .with_variant(&dropped.variant_id)
            .with_detail(dropped.reason.to_string())
    }

    #[must_use]
    pub fn with_variant(mut self, variant_id: &str) -> Self {
        self.variant_id = Some(variant_id.to_string());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Tab-separated line: time, kind, subject, page, variant, detail.
    #[must_use]
    pub fn to_line(&self) -> String {
        let clean = |field: &str| field.replace(['\t', '\n', '\r'], " ");
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.kind,
            clean(&self.subject),
            self.page.map(|page| page.to_string()).unwrap_or_default(),
            self.variant_id.as_deref().map(clean).unwrap_or_default(),
            clean(&self.detail),
        )
    }
}

/// Append-only destination for diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: &Diagnostic);
}

/// Cloneable handle that logs each diagnostic and forwards it to a sink.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn DiagnosticSink>,
    count: Arc<AtomicUsize>,
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        warn!(
            kind = %diagnostic.kind,
            item = %diagnostic.subject,
            page = ?diagnostic.page,
            variant_id = ?diagnostic.variant_id,
            "{}",
            diagnostic.detail
        );
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sink.record(&diagnostic);
    }

    /// Diagnostics reported through this handle and its clones
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

/// Appends tab-separated lines to a file through a background writer.
pub struct FileDiagnostics {
    writer: NonBlocking,
    guard: Mutex<Option<WorkerGuard>>,
}

impl FileDiagnostics {
    /// Open (or create) `path` for appending
    pub fn create(path: &Path) -> Result<Self> {
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("Diagnostics path has no file name: {}", path.display()))?;
        std::fs::create_dir_all(&directory).with_context(|| {
            format!("Failed to create diagnostics directory: {}", directory.display())
        })?;

        let appender = open_appender(&directory, file_name)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        Ok(Self {
            writer,
            guard: Mutex::new(Some(guard)),
        })
    }

    /// Flush pending lines and stop the writer; later records are dropped.
    pub fn close(&self) {
        let guard = self
            .guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(guard);
    }
}

impl DiagnosticSink for FileDiagnostics {
    fn record(&self, diagnostic: &Diagnostic) {
        let mut line = diagnostic.to_line();
        line.push('\n');
        let mut writer = self.writer.clone();
        // the background writer may already be shut down
        let _ = writer.write_all(line.as_bytes());
    }
}

/// Keeps diagnostics in memory.
#[derive(Default)]
pub struct MemoryDiagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemoryDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        self.entries().into_iter().map(|d| d.kind).collect()
    }
}

impl DiagnosticSink for MemoryDiagnostics {
    fn record(&self, diagnostic: &Diagnostic) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic.clone());
    }
}
