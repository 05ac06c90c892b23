//! `spend-reconcile` ingests daily ad-platform spend exports and delivery-tracking exports,
//! reconciles their inconsistent layouts, and produces per-source, per-category counts, costs and
//! derived metrics as a [`types::ReconciledSnapshot`].
//!
//! The primary entrypoint is [`execution::ReconcileEngine::reconcile`] (or the one-shot
//! [`execution::reconcile_batch`]).
//!
//! ## What the engine copes with
//!
//! - **Encodings**: UTF-8, EUC-KR/CP949, UTF-16 (BOM-detected or swept), decoded strictly
//! - **Containers**: delimited text (`,` or tab) and spreadsheets (`.xlsx`, `.xls`, ...), with a
//!   raw-XML fallback for damaged `.xlsx` files
//! - **Header offsets**: a per-source hint first, then auto-detection over the leading rows
//! - **Summary rows**: `합계` / `total` style rows are dropped before aggregation
//! - **Schema drift**: semantic columns resolved by keyword + blacklist, NFC-normalized
//!
//! ## Pipeline
//!
//! file bytes → [`ingestion::FileLoader`] → [`types::RawTable`] → [`processing::RowClassifier`] →
//! [`types::ClassifiedRecord`]s → [`processing::fold`] / [`processing::apply_overrides`] →
//! [`processing::summarize`] → [`types::ReconciledSnapshot`]
//!
//! The [`registry::FormatRegistry`] (built from [`config::ReconcileSettings`]) drives both loading
//! and classification; adding a source means adding a [`registry::ProviderFormat`] row.
//!
//! ## Quick example
//!
//! ```rust
//! use spend_reconcile::config::ReconcileSettings;
//! use spend_reconcile::execution::reconcile_batch;
//! use spend_reconcile::ingestion::SourceFile;
//! use spend_reconcile::types::{ManualAdjustment, OverrideInput};
//!
//! # fn main() -> Result<(), spend_reconcile::ReconcileError> {
//! let files = vec![
//!     SourceFile::new("result_0105.csv", "캠페인 이름,총 비용\n보장분석_A,100000\n상품_B,50000\n"),
//!     SourceFile::new("notes.txt", "not an export"),
//! ];
//! let partner = ManualAdjustment::Override(OverrideInput { spend: 11_270_000.0, unit_cost: 14_000.0 });
//!
//! let snapshot = reconcile_batch(ReconcileSettings::default(), &files, &[partner])?;
//! assert_eq!(snapshot.source("제휴").map(|s| s.total_count), Some(805.0));
//! assert_eq!(snapshot.source("네이버").map(|s| s.cost), Some(150_000.0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: settings, TOML/JSON loading
//! - [`registry`]: per-source format descriptors and filename dispatch
//! - [`ingestion`]: batch inputs, loader strategy chain, per-file observers
//! - [`processing`]: classification, aggregation, metrics
//! - [`execution`]: parallel batch engine, execution events and metrics
//! - [`types`]: data model
//! - [`error`]: error type used across the crate

pub mod config;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod processing;
pub mod registry;
pub mod types;

pub use error::{ReconcileError, ReconcileResult};
