use std::fmt;

use thiserror::Error;

/// Convenience result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// A semantic column the classifier tries to resolve in every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticField {
    /// Spend / cost column.
    Cost,
    /// Direct count column, or the "sent" column of a delivery export.
    Count,
    /// Campaign name or similar free-text label.
    Label,
    /// Explicit classification column, when a source has one.
    Category,
}

impl fmt::Display for SemanticField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cost => "cost",
            Self::Count => "count",
            Self::Label => "label",
            Self::Category => "category",
        };
        f.write_str(s)
    }
}

/// Error type shared by loading, classification, configuration and batch execution.
///
/// File-level variants (`UnrecognizedSource`, `DecodeExhausted`, `RequiredColumnMissing`,
/// `ContainerCorrupt`, `NegativeNetCount`) are never returned from the batch entry point; they are
/// recorded in the run report and forwarded to observers instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Spreadsheet reader error.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Delimited-text reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Zip container error raised by the raw-archive fallback.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Invalid TOML settings.
    #[error("config error: {0}")]
    TomlConfig(#[from] toml::de::Error),

    /// Invalid JSON settings.
    #[error("config error: {0}")]
    JsonConfig(#[from] serde_json::Error),

    /// Invalid glob pattern when collecting a batch.
    #[error("pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Settings were readable but semantically invalid.
    #[error("invalid settings: {message}")]
    InvalidSettings { message: String },

    /// The filename matches no registered format.
    #[error("unrecognized source: no registered format matches '{file}'")]
    UnrecognizedSource { file: String },

    /// Every load strategy failed to yield a usable table.
    #[error("decode exhausted for '{file}': {attempts} attempts yielded no usable table")]
    DecodeExhausted { file: String, attempts: usize },

    /// A semantic column the source is expected to supply could not be resolved.
    #[error("required column missing in '{file}': no {field} column matches {keywords:?}")]
    RequiredColumnMissing {
        file: String,
        field: SemanticField,
        keywords: Vec<String>,
    },

    /// The spreadsheet container was rejected by the standard reader.
    #[error("container corrupt for '{file}': {message}")]
    ContainerCorrupt { file: String, message: String },

    /// A delivery row netted below zero (sent < failed + requeued).
    #[error("negative net count {net} at row {row} of '{file}'")]
    NegativeNetCount { file: String, row: usize, net: f64 },

    /// Manual adjustment values were rejected before the run started.
    #[error("invalid manual adjustment: {message}")]
    InvalidAdjustment { message: String },
}
