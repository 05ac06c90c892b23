//! Engine settings.
//!
//! Everything business-tunable lives here: the format table, category keywords and labels, the
//! fallback category ratio and the bucket names. [`ReconcileSettings::default`] reproduces the
//! built-in table; [`ReconcileSettings::from_path`] loads a versioned TOML or JSON file instead.
//!
//! ```no_run
//! use spend_reconcile::config::ReconcileSettings;
//!
//! # fn main() -> Result<(), spend_reconcile::ReconcileError> {
//! let settings = ReconcileSettings::from_path("reconcile.toml")?;
//! println!("formats={}", settings.formats.len());
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, ReconcileResult};
use crate::registry::{builtin_formats, builtin_header_keywords, FormatRegistry, ProviderFormat};
use crate::types::Category;

/// What to do with a delivery row whose net count is negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeCountPolicy {
    /// Keep the negative value and report the row as an issue.
    #[default]
    Propagate,
    /// Replace the negative value with zero (cost is kept).
    ClampZero,
    /// Drop the row entirely.
    DropRow,
}

/// Display labels for the two categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLabels {
    pub a: String,
    pub b: String,
}

impl CategoryLabels {
    pub fn label(&self, category: Category) -> &str {
        match category {
            Category::A => &self.a,
            Category::B => &self.b,
        }
    }
}

impl Default for CategoryLabels {
    fn default() -> Self {
        Self {
            a: "보장분석".to_string(),
            b: "상품".to_string(),
        }
    }
}

/// Settings for one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Format descriptors in dispatch priority order.
    pub formats: Vec<ProviderFormat>,
    /// Header keywords in addition to every descriptor's label/category keywords.
    pub header_keywords: Vec<String>,
    /// How many leading rows header auto-detection scans.
    pub header_scan_rows: usize,
    /// Label/category values marking subtotal rows.
    pub summary_markers: Vec<String>,
    /// A row is category A when its category text contains any of these.
    pub category_a_keywords: Vec<String>,
    pub category_labels: CategoryLabels,
    /// Source whose accumulators are replaced by the manual override.
    pub partner_channel: String,
    /// Bucket receiving additive corrections and unattributed rows.
    pub other_bucket: String,
    /// Fixed reporting order. When non-empty, sources outside the list fold into the other
    /// bucket and every listed source appears in the snapshot even with no data.
    pub report_sources: Vec<String>,
    /// Category ratio used when the computed one is missing or implausible.
    pub fallback_ratio: f64,
    /// Computed ratios strictly below this are treated as classification failures.
    pub implausible_ratio_below: f64,
    pub negative_count_policy: NegativeCountPolicy,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            formats: builtin_formats(),
            header_keywords: builtin_header_keywords(),
            header_scan_rows: 30,
            summary_markers: ["합계", "총계", "소계", "total", "sum", "grand total"]
                .into_iter()
                .map(String::from)
                .collect(),
            category_a_keywords: vec!["보장".to_string(), "누적".to_string()],
            category_labels: CategoryLabels::default(),
            partner_channel: "제휴".to_string(),
            other_bucket: "기타".to_string(),
            report_sources: ["네이버", "카카오", "토스", "구글", "제휴", "기타"]
                .into_iter()
                .map(String::from)
                .collect(),
            fallback_ratio: 0.898,
            implausible_ratio_below: 0.1,
            negative_count_policy: NegativeCountPolicy::default(),
        }
    }
}

impl ReconcileSettings {
    /// Parse TOML settings. Missing keys take their defaults.
    pub fn from_toml_str(input: &str) -> ReconcileResult<Self> {
        let settings: Self = toml::from_str(input)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse JSON settings. Missing keys take their defaults.
    pub fn from_json_str(input: &str) -> ReconcileResult<Self> {
        let settings: Self = serde_json::from_str(input)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a `.toml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> ReconcileResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(ReconcileError::InvalidSettings {
                message: format!("unsupported settings file extension ({})", path.display()),
            }),
        }
    }

    /// Build the immutable registry described by these settings.
    pub fn registry(&self) -> FormatRegistry {
        FormatRegistry::new(self.formats.clone(), &self.header_keywords)
    }

    fn validate(&self) -> ReconcileResult<()> {
        if !(self.fallback_ratio.is_finite() && (0.0..=1.0).contains(&self.fallback_ratio)) {
            return Err(ReconcileError::InvalidSettings {
                message: format!("fallback_ratio must be within [0, 1], got {}", self.fallback_ratio),
            });
        }
        if !self.implausible_ratio_below.is_finite() || self.implausible_ratio_below < 0.0 {
            return Err(ReconcileError::InvalidSettings {
                message: format!(
                    "implausible_ratio_below must be >= 0, got {}",
                    self.implausible_ratio_below
                ),
            });
        }
        if self.header_scan_rows == 0 {
            return Err(ReconcileError::InvalidSettings {
                message: "header_scan_rows must be > 0".to_string(),
            });
        }
        for f in &self.formats {
            if f.name_pattern.trim().is_empty() {
                return Err(ReconcileError::InvalidSettings {
                    message: format!("format '{}' has an empty name_pattern", f.source),
                });
            }
            if !f.cost_multiplier.is_finite() {
                return Err(ReconcileError::InvalidSettings {
                    message: format!("format '{}' has a non-finite cost_multiplier", f.source),
                });
            }
        }
        Ok(())
    }
}
