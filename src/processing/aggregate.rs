//! Grouped sums keyed by `(source, category)`, plus manual adjustments.
//!
//! Each file folds into its own [`Accumulators`]; the batch result is the [`Accumulators::merge`]
//! of those private folds. Merge is plain per-key addition, so grouping and order of merges do
//! not change the totals.

use std::collections::BTreeMap;

use crate::config::ReconcileSettings;
use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{Accumulator, Category, ClassifiedRecord, ManualAdjustment};

use super::normalize::match_key;

/// Running sums for every `(source, category)` pair seen so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulators {
    entries: BTreeMap<(String, Category), Accumulator>,
}

impl Accumulators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, source: &str, category: Category, cost: f64, count: f64) {
        self.entries
            .entry((source.to_string(), category))
            .or_default()
            .add(cost, count);
    }

    /// Sums for one pair (zero when never seen).
    pub fn get(&self, source: &str, category: Category) -> Accumulator {
        self.entries
            .get(&(source.to_string(), category))
            .copied()
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Category, &Accumulator)> {
        self.entries.iter().map(|((s, c), a)| (s.as_str(), *c, a))
    }

    /// Distinct source names, sorted.
    pub fn sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.entries.keys().map(|(s, _)| s.as_str()).collect();
        out.dedup();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add every entry of `other` into `self`.
    pub fn merge(mut self, other: Accumulators) -> Accumulators {
        for ((source, category), acc) in other.entries {
            self.entries
                .entry((source, category))
                .or_default()
                .add(acc.cost_sum, acc.count_sum);
        }
        self
    }

    /// Drop every accumulator of `source`.
    pub fn reset_source(&mut self, source: &str) {
        self.entries.retain(|(s, _), _| s != source);
    }

    pub fn total_count(&self) -> f64 {
        self.entries.values().map(|a| a.count_sum).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.entries.values().map(|a| a.cost_sum).sum()
    }
}

/// Fold records into fresh accumulators.
///
/// When `settings.report_sources` is non-empty, sources outside it are booked under the other
/// bucket; listed names are matched case- and composition-insensitively.
pub fn fold(records: &[ClassifiedRecord], settings: &ReconcileSettings) -> Accumulators {
    let mut acc = Accumulators::new();
    for r in records {
        acc.add(reporting_name(&r.source_name, settings), r.category, r.cost, r.count);
    }
    acc
}

fn reporting_name<'s>(source: &'s str, settings: &'s ReconcileSettings) -> &'s str {
    if settings.report_sources.is_empty() {
        return source;
    }
    let key = match_key(source);
    settings
        .report_sources
        .iter()
        .find(|listed| match_key(listed) == key)
        .map(String::as_str)
        .unwrap_or(settings.other_bucket.as_str())
}

/// Reject adjustments that cannot be applied: more than one override, or negative/non-finite
/// values.
pub fn validate_adjustments(adjustments: &[ManualAdjustment]) -> ReconcileResult<()> {
    let invalid = |what: &str, v: f64| -> ReconcileResult<()> {
        if v.is_finite() && v >= 0.0 {
            Ok(())
        } else {
            Err(ReconcileError::InvalidAdjustment {
                message: format!("{what} must be a finite value >= 0, got {v}"),
            })
        }
    };

    let mut overrides = 0usize;
    for adj in adjustments {
        match adj {
            ManualAdjustment::Override(o) => {
                overrides += 1;
                invalid("spend", o.spend)?;
                invalid("unit_cost", o.unit_cost)?;
            }
            ManualAdjustment::AdditiveCorrection(c) => {
                invalid("delta_count", c.delta_count)?;
                invalid("delta_cost", c.delta_cost)?;
            }
        }
    }
    if overrides > 1 {
        return Err(ReconcileError::InvalidAdjustment {
            message: format!("at most one partner override per run, got {overrides}"),
        });
    }
    Ok(())
}

/// Apply manual inputs after every file has been folded.
///
/// An override replaces the partner channel outright: its accumulators are cleared and
/// partner/category A becomes `{cost: spend, count: floor(spend / unit_cost)}`. Additive
/// corrections are summed into the other bucket under category B.
pub fn apply_overrides(
    acc: &mut Accumulators,
    adjustments: &[ManualAdjustment],
    settings: &ReconcileSettings,
) -> ReconcileResult<()> {
    validate_adjustments(adjustments)?;

    for adj in adjustments {
        if let ManualAdjustment::Override(o) = adj {
            acc.reset_source(&settings.partner_channel);
            acc.add(&settings.partner_channel, Category::A, o.spend, o.derived_count());
        }
    }
    for adj in adjustments {
        if let ManualAdjustment::AdditiveCorrection(c) = adj {
            acc.add(&settings.other_bucket, Category::B, c.delta_cost, c.delta_count);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AdditiveCorrection, OverrideInput};

    fn rec(source: &str, category: Category, cost: f64, count: f64) -> ClassifiedRecord {
        ClassifiedRecord {
            source_name: source.to_string(),
            category,
            cost,
            count,
        }
    }

    #[test]
    fn fold_groups_and_remaps_unlisted_sources() {
        let settings = ReconcileSettings::default();
        let acc = fold(
            &[
                rec("네이버", Category::A, 10.0, 1.0),
                rec("네이버", Category::A, 5.0, 2.0),
                rec("모비온", Category::B, 7.0, 3.0),
            ],
            &settings,
        );
        assert_eq!(acc.get("네이버", Category::A), Accumulator { cost_sum: 15.0, count_sum: 3.0 });
        assert_eq!(acc.get("기타", Category::B).count_sum, 3.0);
        assert_eq!(acc.sources(), vec!["기타", "네이버"]);
    }

    #[test]
    fn empty_report_list_keeps_every_source() {
        let settings = ReconcileSettings {
            report_sources: Vec::new(),
            ..ReconcileSettings::default()
        };
        let acc = fold(&[rec("모비온", Category::B, 7.0, 3.0)], &settings);
        assert_eq!(acc.get("모비온", Category::B).count_sum, 3.0);
    }

    #[test]
    fn merge_is_associative() {
        let settings = ReconcileSettings::default();
        let a = fold(&[rec("네이버", Category::A, 1.0, 1.0)], &settings);
        let b = fold(&[rec("카카오", Category::B, 2.0, 2.0)], &settings);
        let c = fold(&[rec("네이버", Category::A, 3.0, 3.0)], &settings);
        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));
        assert_eq!(left, right);
        assert_eq!(left.total_count(), 6.0);
    }

    #[test]
    fn override_replaces_partner_rows() {
        let settings = ReconcileSettings::default();
        let mut acc = fold(
            &[rec("제휴", Category::A, 1.0, 999.0), rec("제휴", Category::B, 1.0, 7.0)],
            &settings,
        );
        apply_overrides(
            &mut acc,
            &[ManualAdjustment::Override(OverrideInput {
                spend: 11_270_000.0,
                unit_cost: 14_000.0,
            })],
            &settings,
        )
        .unwrap();
        assert_eq!(acc.get("제휴", Category::A), Accumulator { cost_sum: 11_270_000.0, count_sum: 805.0 });
        assert_eq!(acc.get("제휴", Category::B), Accumulator::default());
    }

    #[test]
    fn corrections_add_to_other_bucket() {
        let settings = ReconcileSettings::default();
        let mut acc = fold(&[rec("기타", Category::B, 100.0, 4.0)], &settings);
        let corr = |n, c| ManualAdjustment::AdditiveCorrection(AdditiveCorrection { delta_count: n, delta_cost: c });
        apply_overrides(&mut acc, &[corr(3.0, 30.0), corr(2.0, 20.0)], &settings).unwrap();
        assert_eq!(acc.get("기타", Category::B), Accumulator { cost_sum: 150.0, count_sum: 9.0 });
    }

    #[test]
    fn invalid_adjustments_are_rejected() {
        let o = |spend| ManualAdjustment::Override(OverrideInput { spend, unit_cost: 1.0 });
        assert!(validate_adjustments(&[o(1.0)]).is_ok());
        assert!(matches!(
            validate_adjustments(&[o(1.0), o(2.0)]),
            Err(ReconcileError::InvalidAdjustment { .. })
        ));
        assert!(validate_adjustments(&[o(-1.0)]).is_err());
        assert!(validate_adjustments(&[o(f64::NAN)]).is_err());
    }
}
