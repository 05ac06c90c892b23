//! Bytes → [`RawTable`], trying strategies in a fixed order.
//!
//! 1. **Known shape**: when the file's descriptor is known, parse exactly the shape a well-formed
//!    export has (hinted header offset, separator and encodings). The result must have more than
//!    one column and at least one of the descriptor's keywords in its header.
//! 2. **Sweep**: for workbooks, the first worksheet with header auto-detection; for text, every
//!    encoding × separator combination with header auto-detection. The first attempt yielding
//!    more than one column wins.
//! 3. **Raw archive**: for zip workbooks the reader rejected, cells are rebuilt from the raw
//!    worksheet XML.
//!
//! When everything fails the result is [`ReconcileError::DecodeExhausted`].

use crate::error::{ReconcileError, ReconcileResult};
use crate::processing::normalize::match_key;
use crate::registry::{FormatRegistry, ProviderFormat};
use crate::types::{LoadStrategy, RawTable};

use super::source::{FileKind, SourceFile};
use super::{archive, excel, text};

/// A successfully loaded table plus non-fatal issues met on the way (for example a
/// [`ReconcileError::ContainerCorrupt`] that the raw-archive fallback recovered from).
#[derive(Debug)]
pub struct Loaded {
    pub table: RawTable,
    pub issues: Vec<ReconcileError>,
}

/// Stateless loader bound to a registry's header keywords.
#[derive(Debug, Clone, Copy)]
pub struct FileLoader<'a> {
    registry: &'a FormatRegistry,
    header_scan_rows: usize,
}

impl<'a> FileLoader<'a> {
    pub fn new(registry: &'a FormatRegistry, header_scan_rows: usize) -> Self {
        Self {
            registry,
            header_scan_rows: header_scan_rows.max(1),
        }
    }

    /// Load one file. `format` is the descriptor resolved from the file name, if any.
    pub fn load(&self, file: &SourceFile, format: Option<&ProviderFormat>) -> ReconcileResult<Loaded> {
        let kind = file.kind();
        let mut issues = Vec::new();
        let mut attempts = 0usize;

        let sheet = if kind.is_spreadsheet() {
            match excel::read_first_sheet(&file.name, &file.bytes) {
                Ok(grid) => Some(grid),
                Err(e) => {
                    issues.push(ReconcileError::ContainerCorrupt {
                        file: file.name.clone(),
                        message: e.to_string(),
                    });
                    None
                }
            }
        } else {
            None
        };

        if let Some(fmt) = format {
            attempts += 1;
            let known = match &sheet {
                Some(grid) => table_at(grid, fmt.header_row_hint.unwrap_or(0), LoadStrategy::KnownSpreadsheet),
                None if kind.is_spreadsheet() => None,
                None => known_delimited(file, fmt),
            };
            if let Some(table) = known.filter(|t| fmt.recognizes_header(&t.columns)) {
                return Ok(Loaded { table, issues });
            }
        }

        if let Some(grid) = &sheet {
            attempts += 1;
            if let Some(table) = self.detect_header(grid, LoadStrategy::SpreadsheetSweep) {
                return Ok(Loaded { table, issues });
            }
        } else if !kind.is_spreadsheet() {
            for encoding in text::sweep_order(&file.bytes) {
                let Some(decoded) = text::decode_strict(&file.bytes, encoding) else {
                    attempts += text::SWEEP_SEPARATORS.len();
                    continue;
                };
                for separator in text::SWEEP_SEPARATORS {
                    attempts += 1;
                    let grid = text::parse_delimited(&decoded, separator);
                    let strategy = LoadStrategy::TextSweep {
                        encoding: encoding.name(),
                        separator,
                    };
                    if let Some(table) = self.detect_header(&grid, strategy) {
                        return Ok(Loaded { table, issues });
                    }
                }
            }
        }

        if kind == FileKind::ZipSpreadsheet && sheet.is_none() {
            attempts += 1;
            match archive::extract_first_sheet(&file.name, &file.bytes) {
                Ok(grid) => {
                    let table = self
                        .detect_header(&grid, LoadStrategy::RawArchive)
                        .or_else(|| first_non_empty_header(&grid));
                    if let Some(table) = table {
                        return Ok(Loaded { table, issues });
                    }
                }
                Err(e) => issues.push(e),
            }
        }

        Err(ReconcileError::DecodeExhausted {
            file: file.name.clone(),
            attempts,
        })
    }

    /// Use the first of the leading rows that contains a registry-wide header keyword and names
    /// more than one column. Title lines that merely mention a keyword are skipped.
    fn detect_header(&self, grid: &[Vec<String>], strategy: LoadStrategy) -> Option<RawTable> {
        let keywords = self.registry.header_keywords();
        grid.iter()
            .take(self.header_scan_rows)
            .enumerate()
            .filter(|(_, row)| {
                row.iter().any(|cell| {
                    let key = match_key(cell);
                    !key.is_empty() && keywords.iter().any(|kw| key.contains(kw.as_str()))
                })
            })
            .find_map(|(idx, _)| table_at(grid, idx, strategy))
    }
}

fn known_delimited(file: &SourceFile, fmt: &ProviderFormat) -> Option<RawTable> {
    let separator = fmt
        .separator_hint
        .filter(char::is_ascii)
        .map(|c| c as u8)
        .unwrap_or(b',');
    let header_row = fmt.header_row_hint.unwrap_or(0);
    fmt.encoding_priority
        .iter()
        .filter_map(|label| text::encoding_for_label(label))
        .filter_map(|encoding| text::decode_strict(&file.bytes, encoding))
        .find_map(|decoded| {
            let grid = text::parse_delimited(&decoded, separator);
            table_at(&grid, header_row, LoadStrategy::KnownDelimited).filter(|t| fmt.recognizes_header(&t.columns))
        })
}

fn first_non_empty_header(grid: &[Vec<String>]) -> Option<RawTable> {
    let idx = grid.iter().position(|row| row.iter().any(|c| !c.trim().is_empty()))?;
    table_at(grid, idx, LoadStrategy::RawArchive)
}

/// Table with `grid[header_row]` as header; `None` unless more than one column is named.
fn table_at(grid: &[Vec<String>], header_row: usize, strategy: LoadStrategy) -> Option<RawTable> {
    let header = grid.get(header_row)?;
    let named = header.iter().filter(|c| !c.trim().is_empty()).count();
    if named <= 1 {
        return None;
    }
    Some(RawTable::from_grid(
        header.clone(),
        grid[header_row + 1..].iter().cloned(),
        header_row,
        strategy,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader_parts() -> FormatRegistry {
        FormatRegistry::default()
    }

    #[test]
    fn known_delimited_uses_hinted_header() {
        let reg = loader_parts();
        let loader = FileLoader::new(&reg, 30);
        let file = SourceFile::new("result.csv", "캠페인 이름,총 비용\n보장분석_A,\"100,000\"\n");
        let loaded = loader.load(&file, reg.resolve(&file.name)).unwrap();
        assert_eq!(loaded.table.strategy, LoadStrategy::KnownDelimited);
        assert_eq!(loaded.table.columns, vec!["캠페인 이름".to_string(), "총 비용".to_string()]);
        assert_eq!(loaded.table.rows, vec![vec!["보장분석_A".to_string(), "100,000".to_string()]]);
    }

    #[test]
    fn sweep_finds_tab_separated_legacy_encoded_header() {
        let reg = loader_parts();
        let loader = FileLoader::new(&reg, 30);
        let (bytes, _, _) = encoding_rs::EUC_KR.encode("보고서\t\n기간\t2024-01-01\n캠페인\t비용\n상품_B\t500\n");
        let file = SourceFile::new("unknown_export.tsv", bytes.into_owned());
        let loaded = loader.load(&file, None).unwrap();
        assert_eq!(
            loaded.table.strategy,
            LoadStrategy::TextSweep {
                encoding: "EUC-KR",
                separator: b'\t'
            }
        );
        assert_eq!(loaded.table.header_row, 2);
        assert_eq!(loaded.table.rows.len(), 1);
    }

    #[test]
    fn title_row_echoing_a_keyword_is_skipped() {
        let reg = loader_parts();
        let loader = FileLoader::new(&reg, 30);
        let file = SourceFile::new("x.csv", "캠페인 보고서\n2024년 1월 5일\n캠페인,비용\n보장분석_A,1000\n");
        let loaded = loader.load(&file, None).unwrap();
        assert_eq!(loaded.table.header_row, 2);
        assert_eq!(loaded.table.columns, vec!["캠페인".to_string(), "비용".to_string()]);
    }

    #[test]
    fn header_beyond_scan_window_is_not_found() {
        let reg = loader_parts();
        let loader = FileLoader::new(&reg, 2);
        let file = SourceFile::new("x.csv", "a,b\nc,d\n캠페인,비용\n");
        let err = loader.load(&file, None).unwrap_err();
        assert!(matches!(err, ReconcileError::DecodeExhausted { .. }));
    }

    #[test]
    fn single_column_table_is_not_usable() {
        assert!(table_at(&[vec!["캠페인".to_string()]], 0, LoadStrategy::KnownDelimited).is_none());
        assert!(table_at(&[], 0, LoadStrategy::KnownDelimited).is_none());
    }

    #[test]
    fn binary_noise_exhausts_every_strategy() {
        let reg = loader_parts();
        let loader = FileLoader::new(&reg, 30);
        let file = SourceFile::new("noise.csv", vec![0xFFu8, 0xFE, 0xFF, 0x00, 0xD8, 0x00, 0xD8]);
        let err = loader.load(&file, None).unwrap_err();
        match err {
            ReconcileError::DecodeExhausted { file, attempts } => {
                assert_eq!(file, "noise.csv");
                assert!(attempts >= 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
