//! Batch engine: many files in, one [`ReconciledSnapshot`] out.
//!
//! Each file is resolved, loaded, classified and folded into a private
//! [`Accumulators`] on a `rayon` pool; no state is shared between files. The private folds are
//! merged in input order, then manual adjustments and metrics run on the calling thread. A file
//! that cannot contribute is recorded in the [`ReconcileReport`] and reported to the
//! [`ReconcileObserver`]; it never fails the batch.
//!
//! ```no_run
//! use spend_reconcile::config::ReconcileSettings;
//! use spend_reconcile::execution::{ExecutionOptions, ReconcileEngine};
//! use spend_reconcile::ingestion::batch_from_dir;
//! use spend_reconcile::types::{ManualAdjustment, OverrideInput};
//!
//! # fn main() -> Result<(), spend_reconcile::ReconcileError> {
//! let engine = ReconcileEngine::new(ReconcileSettings::default(), ExecutionOptions::default())?;
//! let files = batch_from_dir("exports/2024-01-05")?;
//! let report = engine.reconcile(
//!     &files,
//!     &[ManualAdjustment::Override(OverrideInput { spend: 11_270_000.0, unit_cost: 14_000.0 })],
//! )?;
//! println!("total={} ratio={}", report.snapshot.total_count, report.snapshot.category_ratio);
//! # Ok(())
//! # }
//! ```

mod observer;
mod semaphore;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::ReconcileSettings;
use crate::error::{ReconcileError, ReconcileResult};
use crate::ingestion::{FileContext, FileLoader, FileStats, ReconcileObserver, Severity, SourceFile};
use crate::processing::{apply_overrides, fold, summarize, validate_adjustments, Accumulators, RowClassifier};
use crate::registry::FormatRegistry;
use crate::types::{ManualAdjustment, ReconciledSnapshot};

pub use observer::{ExecutionEvent, ExecutionObserver, RunMetrics, RunMetricsSnapshot, StdErrExecutionObserver};

use semaphore::Semaphore;

/// Configuration for the [`ReconcileEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on files being loaded at once.
    ///
    /// This is an additional throttle on top of `num_threads` (file bytes are already in memory;
    /// decoded grids are not).
    pub max_in_flight_files: usize,
    /// Severity threshold at which `on_alert` is invoked for a skipped file.
    pub alert_at_or_above: Severity,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            max_in_flight_files: n.max(1),
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// What happened to one input file.
#[derive(Debug)]
pub enum FileStatus {
    /// The file was loaded and its records folded into the run.
    Contributed(FileStats),
    /// The file contributed nothing.
    Skipped(ReconcileError),
}

/// Per-file entry of a [`ReconcileReport`], in input order.
#[derive(Debug)]
pub struct FileOutcome {
    pub file: String,
    /// Source of the descriptor the file name matched.
    pub source: Option<String>,
    pub status: FileStatus,
    /// Non-fatal problems met while loading or classifying.
    pub issues: Vec<ReconcileError>,
}

impl FileOutcome {
    pub fn contributed(&self) -> bool {
        matches!(self.status, FileStatus::Contributed(_))
    }

    /// Severity of the skip reason, if the file was skipped.
    pub fn skip_severity(&self) -> Option<Severity> {
        match &self.status {
            FileStatus::Skipped(e) => Some(Severity::of(e)),
            FileStatus::Contributed(_) => None,
        }
    }

    fn context(&self) -> FileContext {
        FileContext {
            file: self.file.clone(),
            source: self.source.clone(),
        }
    }
}

/// Result of [`ReconcileEngine::reconcile`].
#[derive(Debug)]
pub struct ReconcileReport {
    pub snapshot: ReconciledSnapshot,
    pub files: Vec<FileOutcome>,
    pub metrics: RunMetricsSnapshot,
}

impl ReconcileReport {
    pub fn skipped(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.contributed())
    }

    /// Every non-fatal issue across all files.
    pub fn issues(&self) -> impl Iterator<Item = &ReconcileError> {
        self.files.iter().flat_map(|f| f.issues.iter())
    }
}

/// Runs reconciliation batches with configurable parallelism.
///
/// The registry is built once from the settings and shared read-only by every worker.
pub struct ReconcileEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
    settings: Arc<ReconcileSettings>,
    registry: Arc<FormatRegistry>,
    observer: Option<Arc<dyn ReconcileObserver>>,
    exec_observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<RunMetrics>,
}

impl fmt::Debug for ReconcileEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcileEngine")
            .field("opts", &self.opts)
            .field("formats", &self.registry.formats().len())
            .field("observer_set", &self.observer.is_some())
            .field("exec_observer_set", &self.exec_observer.is_some())
            .finish()
    }
}

impl ReconcileEngine {
    /// Create an engine.
    ///
    /// Fails with [`ReconcileError::InvalidSettings`] if `num_threads == Some(0)` or the worker
    /// pool cannot be built.
    pub fn new(settings: ReconcileSettings, opts: ExecutionOptions) -> ReconcileResult<Self> {
        if opts.num_threads == Some(0) {
            return Err(ReconcileError::InvalidSettings {
                message: "num_threads must be > 0 when set".to_string(),
            });
        }
        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|e| ReconcileError::InvalidSettings {
                message: format!("failed to build worker pool: {e}"),
            })?;

        let registry = Arc::new(settings.registry());
        Ok(Self {
            pool,
            opts,
            settings: Arc::new(settings),
            registry,
            observer: None,
            exec_observer: None,
            metrics: Arc::new(RunMetrics::new()),
        })
    }

    /// Attach an observer for per-file outcomes.
    pub fn with_observer(mut self, observer: Arc<dyn ReconcileObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach an observer for execution events.
    pub fn with_execution_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.exec_observer = Some(observer);
        self
    }

    /// Get a handle to live run metrics.
    pub fn metrics(&self) -> Arc<RunMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Reconcile one batch.
    ///
    /// Only invalid `adjustments` fail the call (before any file is touched); every file-level
    /// problem ends up in the report.
    pub fn reconcile(
        &self,
        files: &[SourceFile],
        adjustments: &[ManualAdjustment],
    ) -> ReconcileResult<ReconcileReport> {
        validate_adjustments(adjustments)?;

        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted { files: files.len() });

        let per_file: Vec<(FileOutcome, Accumulators)> = self.pool.install(|| self.process_all(files));

        let mut merged = Accumulators::new();
        let mut outcomes = Vec::with_capacity(per_file.len());
        for (outcome, acc) in per_file {
            merged = merged.merge(acc);
            self.notify(&outcome);
            outcomes.push(outcome);
        }

        apply_overrides(&mut merged, adjustments, &self.settings)?;
        let snapshot = summarize(&merged, &self.settings);

        self.metrics.end_run(start.elapsed());
        let metrics = self.metrics.snapshot();
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: metrics.clone(),
        });

        Ok(ReconcileReport {
            snapshot,
            files: outcomes,
            metrics,
        })
    }

    fn process_all(&self, files: &[SourceFile]) -> Vec<(FileOutcome, Accumulators)> {
        let sem = Semaphore::new(self.opts.max_in_flight_files);
        files
            .par_iter()
            .enumerate()
            .map(|(index, file)| {
                let (_permit, waited) = sem.acquire();
                if waited > Duration::ZERO {
                    self.metrics.on_throttle_wait(waited);
                    self.emit(ExecutionEvent::ThrottleWaited { duration: waited });
                }

                self.metrics.on_file_start();
                self.emit(ExecutionEvent::FileStarted {
                    index,
                    file: file.name.clone(),
                });

                let (outcome, acc) = self.process_file(file);
                let records = match &outcome.status {
                    FileStatus::Contributed(stats) => stats.records,
                    FileStatus::Skipped(_) => 0,
                };

                self.emit(ExecutionEvent::FileFinished {
                    index,
                    file: file.name.clone(),
                    records,
                    skipped: !outcome.contributed(),
                });
                self.metrics.on_file_end(records, !outcome.contributed());
                (outcome, acc)
            })
            .collect()
    }

    /// Resolve → load → classify → private fold for one file.
    fn process_file(&self, file: &SourceFile) -> (FileOutcome, Accumulators) {
        let skipped = |source: Option<String>, error: ReconcileError, issues: Vec<ReconcileError>| {
            let outcome = FileOutcome {
                file: file.name.clone(),
                source,
                status: FileStatus::Skipped(error),
                issues,
            };
            (outcome, Accumulators::new())
        };

        let Some(format) = self.registry.resolve(&file.name) else {
            return skipped(
                None,
                ReconcileError::UnrecognizedSource {
                    file: file.name.clone(),
                },
                Vec::new(),
            );
        };
        let source = Some(format.source.clone());

        let loader = FileLoader::new(&self.registry, self.settings.header_scan_rows);
        let loaded = match loader.load(file, Some(format)) {
            Ok(loaded) => loaded,
            Err(e) => return skipped(source, e, Vec::new()),
        };

        let classification = RowClassifier::new(&self.settings).classify(&file.name, &loaded.table, format);
        let acc = fold(&classification.records, &self.settings);

        let mut issues = loaded.issues;
        issues.extend(classification.issues);
        let stats = FileStats {
            strategy: loaded.table.strategy,
            rows: loaded.table.row_count(),
            records: classification.records.len(),
            summary_rows_dropped: classification.summary_rows_dropped,
        };
        let outcome = FileOutcome {
            file: file.name.clone(),
            source,
            status: FileStatus::Contributed(stats),
            issues,
        };
        (outcome, acc)
    }

    fn notify(&self, outcome: &FileOutcome) {
        let Some(obs) = self.observer.as_ref() else {
            return;
        };
        let ctx = outcome.context();
        match &outcome.status {
            FileStatus::Contributed(stats) => obs.on_loaded(&ctx, *stats),
            FileStatus::Skipped(e) => {
                let sev = Severity::of(e);
                obs.on_skipped(&ctx, sev, e);
                if sev >= self.opts.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
        for issue in &outcome.issues {
            obs.on_warning(&ctx, issue);
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.exec_observer {
            obs.on_event(&event);
        }
    }
}

/// One-shot convenience: default execution options, no observers.
pub fn reconcile_batch(
    settings: ReconcileSettings,
    files: &[SourceFile],
    adjustments: &[ManualAdjustment],
) -> ReconcileResult<ReconciledSnapshot> {
    let engine = ReconcileEngine::new(settings, ExecutionOptions::default())?;
    Ok(engine.reconcile(files, adjustments)?.snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn naver(name: &str, rows: &str) -> SourceFile {
        SourceFile::new(name, format!("캠페인 이름,총 비용\n{rows}"))
    }

    fn engine(threads: usize, in_flight: usize) -> ReconcileEngine {
        ReconcileEngine::new(
            ReconcileSettings::default(),
            ExecutionOptions {
                num_threads: Some(threads),
                max_in_flight_files: in_flight,
                alert_at_or_above: Severity::Critical,
            },
        )
        .unwrap()
    }

    struct ConcurrencyObserver {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl ExecutionObserver for ConcurrencyObserver {
        fn on_event(&self, event: &ExecutionEvent) {
            match event {
                ExecutionEvent::FileStarted { .. } => {
                    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                    let _ = self.max_active.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                }
                ExecutionEvent::FileFinished { .. } => {
                    let _ = self.active.fetch_sub(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn zero_threads_is_rejected() {
        let err = ReconcileEngine::new(
            ReconcileSettings::default(),
            ExecutionOptions {
                num_threads: Some(0),
                ..ExecutionOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidSettings { .. }));
    }

    #[test]
    fn max_in_flight_files_throttles_concurrency() {
        let observer = Arc::new(ConcurrencyObserver {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        let obs_trait: Arc<dyn ExecutionObserver> = observer.clone();
        let engine = engine(4, 1).with_execution_observer(obs_trait);
        let files: Vec<SourceFile> = (0..20).map(|i| naver(&format!("result_{i}.csv"), "상품,10\n")).collect();

        let report = engine.reconcile(&files, &[]).unwrap();
        assert_eq!(report.snapshot.source("네이버").map(|s| s.cost), Some(200.0));
        assert_eq!(observer.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(report.metrics.max_active_files, 1);
        assert_eq!(report.metrics.files_finished, 20);
    }

    #[test]
    fn outcomes_follow_input_order() {
        let engine = engine(4, 4);
        let files = vec![
            naver("result_a.csv", "보장_A,1\n"),
            SourceFile::new("notes.txt", "hello"),
            naver("result_b.csv", "상품_B,2\n"),
        ];
        let report = engine.reconcile(&files, &[]).unwrap();
        let names: Vec<&str> = report.files.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(names, vec!["result_a.csv", "notes.txt", "result_b.csv"]);
        assert_eq!(report.skipped().count(), 1);
        assert_eq!(report.files[1].skip_severity(), Some(Severity::Info));
        assert_eq!(report.metrics.files_skipped, 1);
        assert_eq!(report.metrics.records_classified, 2);
    }

    #[test]
    fn invalid_adjustments_fail_before_any_file() {
        let engine = engine(2, 2);
        let metrics = engine.metrics();
        let bad = ManualAdjustment::Override(crate::types::OverrideInput {
            spend: -1.0,
            unit_cost: 1.0,
        });
        let err = engine.reconcile(&[naver("result.csv", "상품,1\n")], &[bad]).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidAdjustment { .. }));
        assert_eq!(metrics.snapshot().run_id, 0);
    }
}
