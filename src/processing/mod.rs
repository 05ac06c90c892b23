//! Classification, aggregation and metrics.
//!
//! - [`classify`]: [`crate::types::RawTable`] → [`crate::types::ClassifiedRecord`]s
//! - [`aggregate`]: grouped sums, associative merge, manual adjustments
//! - [`metrics`]: guarded unit costs, category ratio, snapshot assembly
//! - [`normalize`]: text/number normalization shared by the above
//!
//! ## Example: classify → fold → summarize
//!
//! ```rust
//! use spend_reconcile::config::ReconcileSettings;
//! use spend_reconcile::processing::{fold, summarize, RowClassifier};
//! use spend_reconcile::types::{LoadStrategy, RawTable};
//!
//! let settings = ReconcileSettings::default();
//! let registry = settings.registry();
//! let format = registry.resolve("result_0105.csv").unwrap();
//!
//! let table = RawTable::from_grid(
//!     vec!["캠페인 이름".to_string(), "총 비용".to_string()],
//!     vec![
//!         vec!["보장분석_A".to_string(), "100,000".to_string()],
//!         vec!["합계".to_string(), "100,000".to_string()],
//!     ],
//!     0,
//!     LoadStrategy::KnownDelimited,
//! );
//!
//! let classified = RowClassifier::new(&settings).classify("result_0105.csv", &table, format);
//! let snapshot = summarize(&fold(&classified.records, &settings), &settings);
//! assert_eq!(snapshot.total_cost, 100_000.0);
//! ```

pub mod aggregate;
pub mod classify;
pub mod metrics;
pub mod normalize;

pub use aggregate::{apply_overrides, fold, validate_adjustments, Accumulators};
pub use classify::{is_summary_marker, Classification, RowClassifier};
pub use metrics::{category_ratio, summarize, unit_cost};
