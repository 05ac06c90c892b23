//! Per-file outcome reporting.
//!
//! The batch entry point never fails because of a single file; instead every load, skip and
//! warning is reported to an [`ReconcileObserver`]. Failures at or above the configured
//! threshold are additionally raised through [`ReconcileObserver::on_alert`].

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ReconcileError;
use crate::types::LoadStrategy;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event (e.g. a file no descriptor recognizes).
    Info,
    /// Non-fatal problem; the file contributed partially or not at all.
    Warning,
    /// A file could not be processed for reasons other than its content.
    Error,
    /// Infrastructure failure (typically I/O).
    Critical,
}

impl Severity {
    /// Severity the engine assigns to each error kind.
    pub fn of(error: &ReconcileError) -> Self {
        match error {
            ReconcileError::UnrecognizedSource { .. } => Self::Info,
            ReconcileError::DecodeExhausted { .. }
            | ReconcileError::RequiredColumnMissing { .. }
            | ReconcileError::ContainerCorrupt { .. }
            | ReconcileError::NegativeNetCount { .. } => Self::Warning,
            ReconcileError::Io(_) => Self::Critical,
            ReconcileError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Self::Critical,
                _ => Self::Error,
            },
            _ => Self::Error,
        }
    }
}

/// Which file an event is about.
#[derive(Debug, Clone)]
pub struct FileContext {
    /// File name as given in the batch.
    pub file: String,
    /// Source name of the matched descriptor, if any.
    pub source: Option<String>,
}

/// Stats reported when a file contributes to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub strategy: LoadStrategy,
    pub rows: usize,
    pub records: usize,
    pub summary_rows_dropped: usize,
}

/// Observer interface for per-file outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait ReconcileObserver: Send + Sync {
    /// A file was loaded and classified.
    fn on_loaded(&self, _ctx: &FileContext, _stats: FileStats) {}

    /// A file contributed nothing.
    fn on_skipped(&self, _ctx: &FileContext, _severity: Severity, _error: &ReconcileError) {}

    /// A file contributed, but with a non-fatal issue.
    fn on_warning(&self, _ctx: &FileContext, _error: &ReconcileError) {}

    /// A skip met the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_skipped`].
    fn on_alert(&self, ctx: &FileContext, severity: Severity, error: &ReconcileError) {
        self.on_skipped(ctx, severity, error)
    }
}

/// Fans callbacks out to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ReconcileObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn ReconcileObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ReconcileObserver for CompositeObserver {
    fn on_loaded(&self, ctx: &FileContext, stats: FileStats) {
        for o in &self.observers {
            o.on_loaded(ctx, stats);
        }
    }

    fn on_skipped(&self, ctx: &FileContext, severity: Severity, error: &ReconcileError) {
        for o in &self.observers {
            o.on_skipped(ctx, severity, error);
        }
    }

    fn on_warning(&self, ctx: &FileContext, error: &ReconcileError) {
        for o in &self.observers {
            o.on_warning(ctx, error);
        }
    }

    fn on_alert(&self, ctx: &FileContext, severity: Severity, error: &ReconcileError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

fn source_label(ctx: &FileContext) -> &str {
    ctx.source.as_deref().unwrap_or("-")
}

/// Logs events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl ReconcileObserver for StdErrObserver {
    fn on_loaded(&self, ctx: &FileContext, stats: FileStats) {
        eprintln!(
            "[reconcile][ok] source={} file={} strategy={:?} rows={} records={} summary_dropped={}",
            source_label(ctx),
            ctx.file,
            stats.strategy,
            stats.rows,
            stats.records,
            stats.summary_rows_dropped
        );
    }

    fn on_skipped(&self, ctx: &FileContext, severity: Severity, error: &ReconcileError) {
        eprintln!(
            "[reconcile][skip][{:?}] source={} file={} err={}",
            severity,
            source_label(ctx),
            ctx.file,
            error
        );
    }

    fn on_warning(&self, ctx: &FileContext, error: &ReconcileError) {
        eprintln!(
            "[reconcile][warn] source={} file={} err={}",
            source_label(ctx),
            ctx.file,
            error
        );
    }

    fn on_alert(&self, ctx: &FileContext, severity: Severity, error: &ReconcileError) {
        eprintln!(
            "[ALERT][reconcile][{:?}] source={} file={} err={}",
            severity,
            source_label(ctx),
            ctx.file,
            error
        );
    }
}

/// Appends events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl ReconcileObserver for FileObserver {
    fn on_loaded(&self, ctx: &FileContext, stats: FileStats) {
        self.append_line(&format!(
            "{} ok source={} file={} strategy={:?} rows={} records={}",
            unix_ts(),
            source_label(ctx),
            ctx.file,
            stats.strategy,
            stats.rows,
            stats.records
        ));
    }

    fn on_skipped(&self, ctx: &FileContext, severity: Severity, error: &ReconcileError) {
        self.append_line(&format!(
            "{} skip severity={:?} source={} file={} err={}",
            unix_ts(),
            severity,
            source_label(ctx),
            ctx.file,
            error
        ));
    }

    fn on_warning(&self, ctx: &FileContext, error: &ReconcileError) {
        self.append_line(&format!(
            "{} warn source={} file={} err={}",
            unix_ts(),
            source_label(ctx),
            ctx.file,
            error
        ));
    }

    fn on_alert(&self, ctx: &FileContext, severity: Severity, error: &ReconcileError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} source={} file={} err={}",
            unix_ts(),
            severity,
            source_label(ctx),
            ctx.file,
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
