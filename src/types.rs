//! Core data model shared by loading, classification, aggregation and metrics.
//!
//! Values flow one way: [`RawTable`] → [`ClassifiedRecord`] → [`Accumulator`] →
//! [`ReconciledSnapshot`]. Nothing here is persisted between runs.

use serde::{Deserialize, Serialize};

/// Which loader strategy produced a [`RawTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// The descriptor's exact spreadsheet shape (hinted header offset).
    KnownSpreadsheet,
    /// The descriptor's exact delimited shape (hinted separator/encoding/header offset).
    KnownDelimited,
    /// First worksheet of a container, header row auto-detected.
    SpreadsheetSweep,
    /// Encoding × separator sweep over delimited text, header row auto-detected.
    TextSweep {
        /// Name of the encoding that decoded the bytes (e.g. `"EUC-KR"`).
        encoding: &'static str,
        /// Field separator used.
        separator: u8,
    },
    /// Cells rebuilt from the raw worksheet XML of a damaged container.
    RawArchive,
}

/// The decoded tabular content of one file.
///
/// Every row has exactly `columns.len()` cells. Cells are raw strings; numeric interpretation
/// happens during classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Ordered, trimmed column names taken from the header row.
    pub columns: Vec<String>,
    /// Row-major cell storage (rows below the header).
    pub rows: Vec<Vec<String>>,
    /// 0-based index of the header row within the source grid.
    pub header_row: usize,
    /// Strategy that produced this table.
    pub strategy: LoadStrategy,
}

impl RawTable {
    /// Build a table from a header row and the rows beneath it.
    ///
    /// Rows are padded or truncated to the header width; rows with no non-blank cell are dropped.
    pub fn from_grid(
        header: Vec<String>,
        rows: impl IntoIterator<Item = Vec<String>>,
        header_row: usize,
        strategy: LoadStrategy,
    ) -> Self {
        let columns: Vec<String> = header.into_iter().map(|c| c.trim().to_string()).collect();
        let width = columns.len();
        let rows = rows
            .into_iter()
            .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        Self {
            columns,
            rows,
            header_row,
            strategy,
        }
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell at `(row, col)`, or `""` when out of range.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// One of the two mutually exclusive content classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Guarantee-analysis ("보장분석"); identified by a label keyword.
    A,
    /// Product ("상품"); the default when the category-A keyword is absent.
    B,
}

/// A single retained input row after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub source_name: String,
    pub category: Category,
    /// Cost after the source's multiplier.
    pub cost: f64,
    pub count: f64,
}

/// Running sums for one `(source, category)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Accumulator {
    pub cost_sum: f64,
    pub count_sum: f64,
}

impl Accumulator {
    pub fn add(&mut self, cost: f64, count: f64) {
        self.cost_sum += cost;
        self.count_sum += count;
    }
}

/// Partner-channel override: count is derived from spend and unit cost and replaces anything
/// parsed from files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverrideInput {
    pub spend: f64,
    pub unit_cost: f64,
}

impl OverrideInput {
    /// `floor(spend / unit_cost)`, or 0 when `unit_cost` is not positive.
    pub fn derived_count(&self) -> f64 {
        if self.unit_cost > 0.0 {
            (self.spend / self.unit_cost).floor()
        } else {
            0.0
        }
    }
}

/// Additive correction merged into the "other" bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditiveCorrection {
    pub delta_count: f64,
    pub delta_cost: f64,
}

/// Manually supplied inputs applied after all file-derived folding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManualAdjustment {
    /// Added to the "other" bucket.
    AdditiveCorrection(AdditiveCorrection),
    /// Replaces the partner channel.
    Override(OverrideInput),
}

/// One row of the per-source breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceBreakdown {
    pub source: String,
    pub category_a_count: f64,
    pub category_b_count: f64,
    pub total_count: f64,
    pub cost: f64,
    /// `cost / total_count`, 0 when there is no count.
    pub unit_cost: f64,
}

/// Count/cost totals for a subset of sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelTotals {
    pub category_a_count: f64,
    pub category_b_count: f64,
    pub total_count: f64,
    pub cost: f64,
    pub unit_cost: f64,
}

/// Terminal, read-only output of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledSnapshot {
    pub total_count: f64,
    pub total_cost: f64,
    pub category_a_count: f64,
    pub category_b_count: f64,
    /// Per-source rows, sorted by the configured reporting order then by name.
    pub sources: Vec<SourceBreakdown>,
    /// Category-A share of the total count (or the configured fallback).
    pub category_ratio: f64,
    /// `true` when `category_ratio` is the fallback constant rather than a computed value.
    pub ratio_is_fallback: bool,
    /// `total_cost / total_count`, 0 when there is no count.
    pub overall_unit_cost: f64,
    /// Totals over every source except the partner channel.
    pub excluding_partner: ChannelTotals,
    /// Totals of the partner channel alone.
    pub partner: ChannelTotals,
}

impl ReconciledSnapshot {
    /// Per-source row by name.
    pub fn source(&self, name: &str) -> Option<&SourceBreakdown> {
        self.sources.iter().find(|s| s.source == name)
    }

    /// Unit cost of a source, 0 for unknown sources.
    pub fn unit_cost(&self, name: &str) -> f64 {
        self.source(name).map(|s| s.unit_cost).unwrap_or(0.0)
    }
}
