//! Per-source format descriptors and filename dispatch.
//!
//! Adding a source means adding a [`ProviderFormat`] row (in code or in a settings file); there is
//! no per-source branching anywhere in loading or classification.

use serde::{Deserialize, Serialize};

use crate::processing::normalize::{contains_any, match_key, nfc};

/// Keyword + blacklist rule used to resolve one semantic column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMatcher {
    /// Keywords in priority order.
    pub keywords: Vec<String>,
    /// A column containing any of these never satisfies the field.
    pub blacklist: Vec<String>,
}

impl FieldMatcher {
    pub fn new<S: Into<String>>(keywords: impl IntoIterator<Item = S>) -> Self {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            blacklist: Vec::new(),
        }
    }

    pub fn excluding<S: Into<String>>(mut self, blacklist: impl IntoIterator<Item = S>) -> Self {
        self.blacklist = blacklist.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.iter().all(|k| k.trim().is_empty())
    }

    /// Index of the first column matching a keyword (in keyword order) and no blacklist term.
    pub fn resolve(&self, columns: &[String]) -> Option<usize> {
        self.keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .find_map(|kw| {
                columns.iter().position(|col| {
                    contains_any(col, std::slice::from_ref(kw)) && !contains_any(col, &self.blacklist)
                })
            })
    }
}

/// How a source supplies counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CountRule {
    /// Cost-only source; count is 0.
    #[default]
    None,
    /// Count read directly from one column.
    Column(FieldMatcher),
    /// Delivery tracking: `sent - failed - requeued` per row.
    DeliveryNet {
        sent: FieldMatcher,
        failed: FieldMatcher,
        requeued: FieldMatcher,
    },
}

/// Maps a substring found in an attribution cell to a canonical source name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAlias {
    pub contains: String,
    pub source: String,
}

impl SourceAlias {
    pub fn new(contains: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            contains: contains.into(),
            source: source.into(),
        }
    }
}

/// How the source name of each record is decided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceAttribution {
    /// Every row belongs to the descriptor's `source`.
    #[default]
    Fixed,
    /// Per row: the first alias found in the first attribution column that yields one.
    /// Rows matching no alias go to `fallback` (or the settings' other bucket).
    Columns {
        fields: Vec<FieldMatcher>,
        aliases: Vec<SourceAlias>,
        #[serde(default)]
        fallback: Option<String>,
    },
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_encodings() -> Vec<String> {
    vec!["utf-8".to_string(), "euc-kr".to_string(), "utf-16le".to_string()]
}

/// One recognized source type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFormat {
    /// Canonical source name used for fixed attribution and reporting.
    pub source: String,
    /// Substring matched against the file name.
    pub name_pattern: String,
    /// Fixed 0-based header offset of a well-formed export.
    #[serde(default)]
    pub header_row_hint: Option<usize>,
    /// Separator of a well-formed delimited export (comma when unset).
    #[serde(default)]
    pub separator_hint: Option<char>,
    /// Encoding labels (WHATWG names) tried in order for the known delimited shape.
    #[serde(default = "default_encodings")]
    pub encoding_priority: Vec<String>,
    #[serde(default)]
    pub cost_field: FieldMatcher,
    #[serde(default)]
    pub count_rule: CountRule,
    #[serde(default)]
    pub label_field: FieldMatcher,
    /// Explicit classification column; the label is used when empty.
    #[serde(default)]
    pub category_field: FieldMatcher,
    #[serde(default)]
    pub attribution: SourceAttribution,
    /// Applied to every resolved cost (tax/margin adjustment).
    #[serde(default = "default_multiplier")]
    pub cost_multiplier: f64,
    /// Drop rows whose label cell is blank.
    #[serde(default)]
    pub require_label: bool,
}

impl ProviderFormat {
    /// A fixed-attribution, cost-only descriptor with defaults for everything else.
    pub fn new(source: impl Into<String>, name_pattern: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name_pattern: name_pattern.into(),
            header_row_hint: None,
            separator_hint: None,
            encoding_priority: default_encodings(),
            cost_field: FieldMatcher::default(),
            count_rule: CountRule::None,
            label_field: FieldMatcher::default(),
            category_field: FieldMatcher::default(),
            attribution: SourceAttribution::Fixed,
            cost_multiplier: 1.0,
            require_label: false,
        }
    }

    pub fn matches(&self, filename: &str) -> bool {
        let pattern = nfc(&self.name_pattern);
        !pattern.is_empty() && nfc(filename).contains(&pattern)
    }

    pub fn expects_cost(&self) -> bool {
        !self.cost_field.is_empty()
    }

    pub fn expects_count(&self) -> bool {
        !matches!(self.count_rule, CountRule::None)
    }

    /// Every keyword this descriptor can resolve a column with.
    pub fn keywords(&self) -> Vec<&str> {
        let mut matchers: Vec<&FieldMatcher> = vec![&self.cost_field, &self.label_field, &self.category_field];
        match &self.count_rule {
            CountRule::None => {}
            CountRule::Column(m) => matchers.push(m),
            CountRule::DeliveryNet { sent, failed, requeued } => matchers.extend([sent, failed, requeued]),
        }
        if let SourceAttribution::Columns { fields, .. } = &self.attribution {
            matchers.extend(fields.iter());
        }
        matchers
            .into_iter()
            .flat_map(|m| m.keywords.iter().map(String::as_str))
            .filter(|k| !k.trim().is_empty())
            .collect()
    }

    /// `true` if any of this descriptor's keywords resolves against `columns`.
    pub fn recognizes_header(&self, columns: &[String]) -> bool {
        self.keywords()
            .iter()
            .any(|kw| columns.iter().any(|c| contains_any(c, &[*kw])))
    }
}

/// Immutable, ordered table of [`ProviderFormat`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatRegistry {
    formats: Vec<ProviderFormat>,
    header_keywords: Vec<String>,
}

impl FormatRegistry {
    /// Build a registry. `extra_header_keywords` are added to every descriptor's label and
    /// category keywords to form the header auto-detection set.
    pub fn new(formats: Vec<ProviderFormat>, extra_header_keywords: &[String]) -> Self {
        let mut header_keywords: Vec<String> = Vec::new();
        let candidates = extra_header_keywords.iter().map(String::as_str).chain(
            formats.iter().flat_map(|f| {
                f.label_field
                    .keywords
                    .iter()
                    .chain(f.category_field.keywords.iter())
                    .map(String::as_str)
            }),
        );
        for kw in candidates {
            let key = match_key(kw);
            if !key.is_empty() && !header_keywords.contains(&key) {
                header_keywords.push(key);
            }
        }
        Self {
            formats,
            header_keywords,
        }
    }

    /// First descriptor (in priority order) whose pattern is a substring of `filename`.
    pub fn resolve(&self, filename: &str) -> Option<&ProviderFormat> {
        self.formats.iter().find(|f| f.matches(filename))
    }

    /// Registry-wide header keywords (already match-normalized).
    pub fn header_keywords(&self) -> &[String] {
        &self.header_keywords
    }

    pub fn formats(&self) -> &[ProviderFormat] {
        &self.formats
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new(builtin_formats(), &builtin_header_keywords())
    }
}

pub(crate) fn builtin_header_keywords() -> Vec<String> {
    ["캠페인", "구분", "campaign"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Per-result cost columns share the word "cost" with the total cost column.
const PER_RESULT_COST: [&str; 8] = ["당", "평균", "단가", "per", "avg", "cpc", "cpa", "cpm"];

/// The descriptor table for the platforms this engine was built around, in priority order.
pub fn builtin_formats() -> Vec<ProviderFormat> {
    let campaign = FieldMatcher::new(["캠페인 이름", "캠페인 명", "캠페인", "campaign"]);
    let media = |keyword: &str, source: &str| SourceAlias::new(keyword, source);

    vec![
        ProviderFormat {
            cost_field: FieldMatcher::new(["총 비용", "비용"]).excluding(PER_RESULT_COST),
            label_field: campaign.clone(),
            ..ProviderFormat::new("네이버", "result")
        },
        ProviderFormat {
            cost_field: FieldMatcher::new(["비용"]).excluding(PER_RESULT_COST),
            label_field: campaign.clone(),
            cost_multiplier: 1.1,
            ..ProviderFormat::new("카카오", "메리츠화재다이렉트")
        },
        ProviderFormat {
            header_row_hint: Some(3),
            cost_field: FieldMatcher::new(["소진 비용"]).excluding(PER_RESULT_COST),
            label_field: campaign.clone(),
            cost_multiplier: 1.1,
            ..ProviderFormat::new("토스", "메리츠 화재")
        },
        ProviderFormat {
            cost_field: FieldMatcher::new(["비용", "cost"]).excluding(PER_RESULT_COST),
            label_field: campaign,
            cost_multiplier: 1.1 * 1.15,
            require_label: true,
            ..ProviderFormat::new("구글", "캠페인 보고서")
        },
        ProviderFormat {
            count_rule: CountRule::DeliveryNet {
                sent: FieldMatcher::new(["METIS전송"]),
                failed: FieldMatcher::new(["METIS실패"]),
                requeued: FieldMatcher::new(["METIS재인입"]),
            },
            label_field: FieldMatcher::new(["구분"]),
            category_field: FieldMatcher::new(["구분"]),
            attribution: SourceAttribution::Columns {
                fields: vec![FieldMatcher::new(["account"]), FieldMatcher::new(["구분"])],
                aliases: vec![
                    media("DDN", "카카오"),
                    media("GDN", "구글"),
                    media("네이버", "네이버"),
                    media("카카오", "카카오"),
                    media("토스", "토스"),
                    media("구글", "구글"),
                    media("NAVER", "네이버"),
                    media("KAKAO", "카카오"),
                    media("TOSS", "토스"),
                    media("GOOGLE", "구글"),
                ],
                fallback: None,
            },
            ..ProviderFormat::new("퍼포먼스랩", "Performance Lab")
        },
    ]
}
