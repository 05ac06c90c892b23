use std::sync::{Arc, Mutex};

use spend_reconcile::config::ReconcileSettings;
use spend_reconcile::error::SemanticField;
use spend_reconcile::execution::{ExecutionEvent, ExecutionObserver, ExecutionOptions, ReconcileEngine};
use spend_reconcile::ingestion::{FileContext, FileStats, ReconcileObserver, Severity, SourceFile};
use spend_reconcile::ReconcileError;

#[derive(Default)]
struct RecordingObserver {
    loaded: Mutex<Vec<(String, usize)>>,
    skipped: Mutex<Vec<(String, Severity)>>,
    alerts: Mutex<Vec<Severity>>,
    warnings: Mutex<Vec<String>>,
}

impl ReconcileObserver for RecordingObserver {
    fn on_loaded(&self, ctx: &FileContext, stats: FileStats) {
        self.loaded.lock().unwrap().push((ctx.file.clone(), stats.records));
    }

    fn on_skipped(&self, ctx: &FileContext, severity: Severity, _error: &ReconcileError) {
        self.skipped.lock().unwrap().push((ctx.file.clone(), severity));
    }

    fn on_warning(&self, _ctx: &FileContext, error: &ReconcileError) {
        self.warnings.lock().unwrap().push(error.to_string());
    }

    fn on_alert(&self, _ctx: &FileContext, severity: Severity, _error: &ReconcileError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl ExecutionObserver for EventLog {
    fn on_event(&self, event: &ExecutionEvent) {
        let tag = match event {
            ExecutionEvent::RunStarted { .. } => "run_started",
            ExecutionEvent::ThrottleWaited { .. } => return,
            ExecutionEvent::FileStarted { .. } => "file_started",
            ExecutionEvent::FileFinished { .. } => "file_finished",
            ExecutionEvent::RunFinished { .. } => "run_finished",
        };
        self.events.lock().unwrap().push(tag.to_string());
    }
}

fn engine_with(obs: Arc<RecordingObserver>, alert_at_or_above: Severity) -> ReconcileEngine {
    ReconcileEngine::new(
        ReconcileSettings::default(),
        ExecutionOptions {
            num_threads: Some(2),
            max_in_flight_files: 2,
            alert_at_or_above,
        },
    )
    .unwrap()
    .with_observer(obs)
}

#[test]
fn skipped_files_are_reported_with_severity() {
    let obs = Arc::new(RecordingObserver::default());
    let engine = engine_with(obs.clone(), Severity::Critical);
    let files = vec![
        SourceFile::new("result.csv", "캠페인 이름,총 비용\n상품,10\n"),
        SourceFile::new("unknown.csv", "a,b\n1,2\n"),
        SourceFile::new("result_garbled.csv", vec![0xFFu8, 0xFF, 0x00]),
    ];

    let report = engine.reconcile(&files, &[]).unwrap();
    assert_eq!(report.snapshot.total_cost, 10.0);

    assert_eq!(obs.loaded.lock().unwrap().clone(), vec![("result.csv".to_string(), 1)]);
    assert_eq!(
        obs.skipped.lock().unwrap().clone(),
        vec![
            ("unknown.csv".to_string(), Severity::Info),
            ("result_garbled.csv".to_string(), Severity::Warning),
        ]
    );
    assert!(obs.alerts.lock().unwrap().is_empty());
    assert!(matches!(
        report.files[2].status,
        spend_reconcile::execution::FileStatus::Skipped(ReconcileError::DecodeExhausted { .. })
    ));
}

#[test]
fn alert_threshold_controls_on_alert() {
    let obs = Arc::new(RecordingObserver::default());
    let engine = engine_with(obs.clone(), Severity::Info);
    let _ = engine
        .reconcile(&[SourceFile::new("unknown.csv", "a,b\n1,2\n")], &[])
        .unwrap();
    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![Severity::Info]);
}

#[test]
fn missing_columns_surface_as_warnings() {
    let obs = Arc::new(RecordingObserver::default());
    let engine = engine_with(obs.clone(), Severity::Critical);
    let report = engine
        .reconcile(&[SourceFile::new("result.csv", "캠페인 이름,노출수\n상품,10\n")], &[])
        .unwrap();

    assert!(report.files[0].contributed());
    assert!(report.issues().any(|e| matches!(
        e,
        ReconcileError::RequiredColumnMissing {
            field: SemanticField::Cost,
            ..
        }
    )));
    let warnings = obs.warnings.lock().unwrap().clone();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("no cost column"));
}

#[test]
fn execution_events_bracket_every_file() {
    let log = Arc::new(EventLog::default());
    let engine = ReconcileEngine::new(ReconcileSettings::default(), ExecutionOptions::default())
        .unwrap()
        .with_execution_observer(log.clone());
    let files = vec![
        SourceFile::new("result_1.csv", "캠페인 이름,총 비용\n상품,10\n"),
        SourceFile::new("result_2.csv", "캠페인 이름,총 비용\n상품,20\n"),
    ];
    let report = engine.reconcile(&files, &[]).unwrap();

    let events = log.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("run_started"));
    assert_eq!(events.last().map(String::as_str), Some("run_finished"));
    assert_eq!(events.iter().filter(|e| *e == "file_started").count(), 2);
    assert_eq!(events.iter().filter(|e| *e == "file_finished").count(), 2);
    assert_eq!(report.metrics.files_finished, 2);
    assert!(report.metrics.elapsed.is_some());
}
