//! Input files of a reconciliation batch.
//!
//! Format dispatch is by file *name* (see [`crate::registry::FormatRegistry::resolve`]); the
//! container kind comes from the bytes alone, since platforms routinely save delimited text
//! under a workbook extension.

use std::fmt;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::ReconcileResult;

/// Physical container kind of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Zip-based workbook (`.xlsx`, `.xlsm`, `.ods`, ...).
    ZipSpreadsheet,
    /// Legacy compound-document workbook (`.xls`).
    LegacySpreadsheet,
    /// Anything else is treated as delimited text.
    Delimited,
}

impl FileKind {
    pub fn is_spreadsheet(self) -> bool {
        !matches!(self, Self::Delimited)
    }

    /// Classify by magic bytes; the extension is not consulted.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) {
            Self::ZipSpreadsheet
        } else if bytes.starts_with(CFB_MAGIC) {
            Self::LegacySpreadsheet
        } else {
            Self::Delimited
        }
    }
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// One named input file held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name used for format dispatch (no directory components required).
    pub name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file; its name is the final path component.
    pub fn from_path(path: impl AsRef<Path>) -> ReconcileResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }

    pub fn kind(&self) -> FileKind {
        FileKind::detect(&self.bytes)
    }
}

/// Every regular file under `dir` (recursively), sorted by path.
///
/// Hidden files and spreadsheet lock files (`~$...`) are skipped.
pub fn batch_from_dir(dir: impl AsRef<Path>) -> ReconcileResult<Vec<SourceFile>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name.starts_with("~$") {
            continue;
        }
        paths.push(entry.into_path());
    }
    paths.into_iter().map(SourceFile::from_path).collect()
}

/// Every regular file matching a glob pattern, in the glob's (sorted) order.
pub fn batch_from_glob(pattern: &str) -> ReconcileResult<Vec<SourceFile>> {
    let mut out = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = entry.map_err(|e| e.into_error())?;
        if path.is_file() {
            out.push(SourceFile::from_path(path)?);
        }
    }
    Ok(out)
}
