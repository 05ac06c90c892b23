//! [`RawTable`] → [`ClassifiedRecord`]s for one file.
//!
//! Columns are resolved once per table through the descriptor's [`FieldMatcher`]s; every row is
//! then checked against the summary markers, parsed, adjusted by the cost multiplier, given a
//! category and attributed to a source. A field the descriptor expects but the table lacks is
//! reported as [`ReconcileError::RequiredColumnMissing`] and only that field's contribution is
//! lost.

use crate::config::{NegativeCountPolicy, ReconcileSettings};
use crate::error::{ReconcileError, SemanticField};
use crate::registry::{CountRule, FieldMatcher, ProviderFormat, SourceAlias, SourceAttribution};
use crate::types::{Category, ClassifiedRecord, RawTable};

use super::normalize::{contains_any, match_key, parse_number};

/// Output of [`RowClassifier::classify`].
#[derive(Debug, Default)]
pub struct Classification {
    pub records: Vec<ClassifiedRecord>,
    /// Non-fatal problems (missing columns, negative delivery nets).
    pub issues: Vec<ReconcileError>,
    pub summary_rows_dropped: usize,
}

/// Column indexes resolved for one table.
#[derive(Debug, Default)]
struct Columns {
    cost: Option<usize>,
    count: CountColumns,
    label: Option<usize>,
    category: Option<usize>,
    attribution: Vec<usize>,
}

#[derive(Debug, Default)]
enum CountColumns {
    #[default]
    Unconfigured,
    Missing,
    Direct(usize),
    Net {
        sent: usize,
        failed: Option<usize>,
        requeued: Option<usize>,
    },
}

/// Stateless classifier bound to one set of settings.
#[derive(Debug, Clone, Copy)]
pub struct RowClassifier<'a> {
    settings: &'a ReconcileSettings,
}

impl<'a> RowClassifier<'a> {
    pub fn new(settings: &'a ReconcileSettings) -> Self {
        Self { settings }
    }

    /// Classify every data row of `table`, which was loaded from `file` and matched `format`.
    pub fn classify(&self, file: &str, table: &RawTable, format: &ProviderFormat) -> Classification {
        let mut out = Classification::default();
        let cols = resolve_columns(file, table, format, &mut out.issues);

        let contributes = cols.cost.is_some() || matches!(cols.count, CountColumns::Direct(_) | CountColumns::Net { .. });
        if !contributes {
            return out;
        }

        for (idx, row) in table.rows.iter().enumerate() {
            let cell = |c: Option<usize>| c.and_then(|c| row.get(c)).map(String::as_str).unwrap_or("");
            let label = cell(cols.label);
            let category_text = if cols.category.is_some() { cell(cols.category) } else { label };

            if self.is_summary_row(label) || self.is_summary_row(category_text) {
                out.summary_rows_dropped += 1;
                continue;
            }
            if format.require_label && cols.label.is_some() && label.trim().is_empty() {
                continue;
            }

            let cost = cols.cost.map(|c| parse_number(cell(Some(c)))).unwrap_or(0.0) * format.cost_multiplier;
            let count = match cols.count {
                CountColumns::Unconfigured | CountColumns::Missing => 0.0,
                CountColumns::Direct(c) => parse_number(cell(Some(c))),
                CountColumns::Net { sent, failed, requeued } => {
                    let net = parse_number(cell(Some(sent)))
                        - failed.map(|c| parse_number(cell(Some(c)))).unwrap_or(0.0)
                        - requeued.map(|c| parse_number(cell(Some(c)))).unwrap_or(0.0);
                    if net < 0.0 {
                        match self.settings.negative_count_policy {
                            NegativeCountPolicy::Propagate => {
                                out.issues.push(ReconcileError::NegativeNetCount {
                                    file: file.to_string(),
                                    row: idx,
                                    net,
                                });
                                net
                            }
                            NegativeCountPolicy::ClampZero => 0.0,
                            NegativeCountPolicy::DropRow => continue,
                        }
                    } else {
                        net
                    }
                }
            };

            let category = if contains_any(category_text, &self.settings.category_a_keywords) {
                Category::A
            } else {
                Category::B
            };

            let source_name = match &format.attribution {
                SourceAttribution::Fixed => format.source.clone(),
                SourceAttribution::Columns { aliases, fallback, .. } => cols
                    .attribution
                    .iter()
                    .find_map(|&c| alias_for(cell(Some(c)), aliases))
                    .map(str::to_string)
                    .or_else(|| fallback.clone())
                    .unwrap_or_else(|| self.settings.other_bucket.clone()),
            };

            out.records.push(ClassifiedRecord {
                source_name,
                category,
                cost,
                count,
            });
        }
        out
    }

    fn is_summary_row(&self, cell: &str) -> bool {
        is_summary_marker(cell, &self.settings.summary_markers)
    }
}

/// `true` when `cell` is a marker (ignoring whitespace), or starts or ends with one at a word
/// boundary: `"캠페인 합계"` and `"Grand Total:"` are summary rows, `"Summer_보장"` is not.
pub fn is_summary_marker<S: AsRef<str>>(cell: &str, markers: &[S]) -> bool {
    let key = match_key(cell);
    if key.is_empty() {
        return false;
    }
    let squashed = squash(&key);
    markers.iter().any(|m| {
        let marker = match_key(m.as_ref());
        if marker.is_empty() {
            return false;
        }
        if squashed == squash(&marker) {
            return true;
        }
        let prefix = key
            .strip_prefix(marker.as_str())
            .is_some_and(|rest| rest.chars().next().is_some_and(is_boundary));
        let suffix = key
            .strip_suffix(marker.as_str())
            .is_some_and(|head| head.chars().next_back().is_some_and(is_boundary));
        prefix || suffix
    })
}

fn is_boundary(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_')
}

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn alias_for<'s>(cell: &str, aliases: &'s [SourceAlias]) -> Option<&'s str> {
    aliases
        .iter()
        .find(|a| contains_any(cell, std::slice::from_ref(&a.contains)))
        .map(|a| a.source.as_str())
}

fn resolve_columns(
    file: &str,
    table: &RawTable,
    format: &ProviderFormat,
    issues: &mut Vec<ReconcileError>,
) -> Columns {
    let mut required = |field: SemanticField, matcher: &FieldMatcher| -> Option<usize> {
        if matcher.is_empty() {
            return None;
        }
        let found = matcher.resolve(&table.columns);
        if found.is_none() {
            issues.push(ReconcileError::RequiredColumnMissing {
                file: file.to_string(),
                field,
                keywords: matcher.keywords.clone(),
            });
        }
        found
    };

    let cost = required(SemanticField::Cost, &format.cost_field);
    let label = required(SemanticField::Label, &format.label_field);
    let category = required(SemanticField::Category, &format.category_field);
    let count = match &format.count_rule {
        CountRule::None => CountColumns::Unconfigured,
        CountRule::Column(m) => required(SemanticField::Count, m)
            .map(CountColumns::Direct)
            .unwrap_or(CountColumns::Missing),
        CountRule::DeliveryNet { sent, failed, requeued } => match required(SemanticField::Count, sent) {
            Some(sent) => CountColumns::Net {
                sent,
                failed: failed.resolve(&table.columns),
                requeued: requeued.resolve(&table.columns),
            },
            None => CountColumns::Missing,
        },
    };

    let attribution = match &format.attribution {
        SourceAttribution::Fixed => Vec::new(),
        SourceAttribution::Columns { fields, .. } => fields.iter().filter_map(|m| m.resolve(&table.columns)).collect(),
    };

    Columns {
        cost,
        count,
        label,
        category,
        attribution,
    }
}
