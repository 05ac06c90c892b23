//! Derived metrics over the final accumulators.

use crate::config::ReconcileSettings;
use crate::types::{Category, ChannelTotals, ReconciledSnapshot, SourceBreakdown};

use super::aggregate::Accumulators;

/// `cost / count`, or 0 when there is no positive count.
pub fn unit_cost(cost: f64, count: f64) -> f64 {
    if count > 0.0 { cost / count } else { 0.0 }
}

/// Category-A share of `total`, and whether the fallback replaced it.
///
/// The fallback is used when `total` is not positive or the computed share is below
/// `implausible_below` (a near-zero share means classification failed, not that there is no
/// category-A volume).
pub fn category_ratio(category_a: f64, total: f64, fallback: f64, implausible_below: f64) -> (f64, bool) {
    if total > 0.0 {
        let ratio = category_a / total;
        if ratio < implausible_below {
            (fallback, true)
        } else {
            (ratio, false)
        }
    } else {
        (fallback, true)
    }
}

/// Build the snapshot.
///
/// Sources are listed in `settings.report_sources` order (every listed source appears, even with
/// no data), followed by any other source in name order.
pub fn summarize(acc: &Accumulators, settings: &ReconcileSettings) -> ReconciledSnapshot {
    let mut names: Vec<&str> = settings.report_sources.iter().map(String::as_str).collect();
    for s in acc.sources() {
        if !names.contains(&s) {
            names.push(s);
        }
    }

    let sources: Vec<SourceBreakdown> = names.into_iter().map(|name| breakdown(acc, name)).collect();

    let overall = channel_totals(sources.iter());
    let partner = channel_totals(sources.iter().filter(|s| s.source == settings.partner_channel));
    let excluding_partner = channel_totals(sources.iter().filter(|s| s.source != settings.partner_channel));

    let (ratio, ratio_is_fallback) = category_ratio(
        overall.category_a_count,
        overall.total_count,
        settings.fallback_ratio,
        settings.implausible_ratio_below,
    );

    ReconciledSnapshot {
        total_count: overall.total_count,
        total_cost: overall.cost,
        category_a_count: overall.category_a_count,
        category_b_count: overall.category_b_count,
        sources,
        category_ratio: ratio,
        ratio_is_fallback,
        overall_unit_cost: overall.unit_cost,
        excluding_partner,
        partner,
    }
}

fn breakdown(acc: &Accumulators, name: &str) -> SourceBreakdown {
    let a = acc.get(name, Category::A);
    let b = acc.get(name, Category::B);
    let total_count = a.count_sum + b.count_sum;
    let cost = a.cost_sum + b.cost_sum;
    SourceBreakdown {
        source: name.to_string(),
        category_a_count: a.count_sum,
        category_b_count: b.count_sum,
        total_count,
        cost,
        unit_cost: unit_cost(cost, total_count),
    }
}

fn channel_totals<'a>(rows: impl Iterator<Item = &'a SourceBreakdown>) -> ChannelTotals {
    let mut t = ChannelTotals::default();
    for r in rows {
        t.category_a_count += r.category_a_count;
        t.category_b_count += r.category_b_count;
        t.total_count += r.total_count;
        t.cost += r.cost;
    }
    t.unit_cost = unit_cost(t.cost, t.total_count);
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_cost_guards_zero_count() {
        assert_eq!(unit_cost(50_000.0, 0.0), 0.0);
        assert_eq!(unit_cost(50_000.0, -3.0), 0.0);
        assert_eq!(unit_cost(100.0, 4.0), 25.0);
    }

    #[test]
    fn ratio_falls_back_when_missing_or_implausible() {
        assert_eq!(category_ratio(0.0, 0.0, 0.898, 0.1), (0.898, true));
        assert_eq!(category_ratio(1.0, 100.0, 0.898, 0.1), (0.898, true));
        assert_eq!(category_ratio(50.0, 100.0, 0.898, 0.1), (0.5, false));
    }

    #[test]
    fn listed_sources_always_appear_in_order() {
        let settings = ReconcileSettings::default();
        let mut acc = Accumulators::new();
        acc.add("구글", Category::A, 300.0, 3.0);
        acc.add("제휴", Category::A, 1_000.0, 2.0);
        let snap = summarize(&acc, &settings);
        let names: Vec<&str> = snap.sources.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(names, vec!["네이버", "카카오", "토스", "구글", "제휴", "기타"]);
        assert_eq!(snap.unit_cost("네이버"), 0.0);
        assert_eq!(snap.unit_cost("구글"), 100.0);
        assert_eq!(snap.partner.total_count, 2.0);
        assert_eq!(snap.excluding_partner.cost, 300.0);
        assert_eq!(snap.total_count, 5.0);
        assert_eq!(snap.total_cost, 1_300.0);
        assert!(!snap.ratio_is_fallback);
        assert_eq!(snap.category_ratio, 1.0);
    }
}
