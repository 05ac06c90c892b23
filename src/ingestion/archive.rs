//! Last-resort extraction for workbooks the spreadsheet reader rejects.
//!
//! The container is opened as a plain zip archive; the shared-string table and the first
//! worksheet's cell XML are walked directly with a lenient XML reader (mismatched end tags are
//! tolerated, a parse error ends the walk with whatever was collected), and the grid is rebuilt
//! from cell coordinates and type flags.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::{ReconcileError, ReconcileResult};

const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/sheet";

/// Worksheet limits; coordinates beyond them come from damaged XML and are dropped.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLS: usize = 16_384;

/// Rebuild the first worksheet of a zip-based workbook as a string grid.
pub fn extract_first_sheet(file: &str, bytes: &[u8]) -> ReconcileResult<Vec<Vec<String>>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let shared_strings = match read_entry(&mut archive, SHARED_STRINGS) {
        Some(xml) => parse_shared_strings(&xml),
        None => Vec::new(),
    };

    let sheet_name = first_worksheet_name(archive.file_names()).ok_or_else(|| {
        ReconcileError::ContainerCorrupt {
            file: file.to_string(),
            message: "archive contains no worksheet".to_string(),
        }
    })?;
    let sheet_xml = read_entry(&mut archive, &sheet_name).ok_or_else(|| ReconcileError::ContainerCorrupt {
        file: file.to_string(),
        message: format!("worksheet '{sheet_name}' is unreadable"),
    })?;

    let cells = extract_cells(&sheet_xml, &shared_strings);
    Ok(cells_to_grid(cells))
}

/// `xl/worksheets/sheetN.xml` with the smallest N.
fn first_worksheet_name<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    names
        .filter(|n| n.starts_with(WORKSHEET_PREFIX) && n.ends_with(".xml"))
        .min_by_key(|n| {
            let digits = &n[WORKSHEET_PREFIX.len()..n.len() - ".xml".len()];
            (digits.parse::<usize>().unwrap_or(usize::MAX), n.to_string())
        })
        .map(str::to_string)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut buf = Vec::new();
    // A truncated entry still yields its readable prefix.
    let _ = entry.read_to_end(&mut buf);
    if buf.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

fn lenient_reader(xml: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    reader
}

/// Resolve a predefined or numeric entity reference by name (without `&`/`;`).
fn resolve_entity(name: &str) -> Option<String> {
    let resolved = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some(resolved.to_string())
}

/// Each `<si>` is either `<t>text</t>` or rich text runs `<r><t>..</t></r>`; runs are joined.
fn parse_shared_strings(xml: &str) -> Vec<String> {
    let mut reader = lenient_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(ref e)) if in_t => current.push_str(&String::from_utf8_lossy(e)),
            Ok(Event::GeneralRef(ref e)) if in_t => {
                if let Some(s) = resolve_entity(&String::from_utf8_lossy(e)) {
                    current.push_str(&s);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    strings
}

/// Convert a cell reference such as `"AB12"` into 0-based `(row, col)`.
fn parse_cell_ref(cell_ref: &str) -> Option<(usize, usize)> {
    let split = cell_ref.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell_ref.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .chars()
        .try_fold(0usize, |acc, ch| {
            acc.checked_mul(26)?
                .checked_add(ch.to_ascii_uppercase() as usize - 'A' as usize + 1)
        })?
        .checked_sub(1)?;
    let row = digits.parse::<usize>().ok()?.checked_sub(1)?;
    in_sheet((row, col)).then_some((row, col))
}

fn in_sheet((row, col): (usize, usize)) -> bool {
    row < MAX_ROWS && col < MAX_COLS
}

/// 1-based `r` attribute of a `<row>` as a 0-based index.
fn parse_row_ref(r: &str) -> Option<usize> {
    r.parse::<usize>().ok()?.checked_sub(1)
}

#[derive(Default)]
struct PendingCell {
    position: Option<(usize, usize)>,
    kind: Option<String>,
    value: String,
    inline: String,
}

fn resolve_value(cell: &PendingCell, shared_strings: &[String]) -> Option<String> {
    let text = match cell.kind.as_deref() {
        Some("s") => shared_strings.get(cell.value.trim().parse::<usize>().ok()?)?.clone(),
        Some("inlineStr") => cell.inline.clone(),
        Some("b") => match cell.value.trim() {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            _ => return None,
        },
        _ => cell.value.clone(),
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Walk `<sheetData>`; rows/cells without coordinates continue from the previous position.
fn extract_cells(xml: &str, shared_strings: &[String]) -> BTreeMap<(usize, usize), String> {
    let mut reader = lenient_reader(xml);
    let mut buf = Vec::new();
    let mut cells = BTreeMap::new();

    let mut next_row = 0usize;
    let mut row = 0usize;
    let mut next_col = 0usize;
    let mut cell: Option<PendingCell> = None;
    let mut in_v = false;
    let mut in_inline_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    row = attr(e, b"r").and_then(|r| parse_row_ref(&r)).unwrap_or(next_row);
                    next_row = row.saturating_add(1);
                    next_col = 0;
                }
                b"c" => {
                    let position = attr(e, b"r")
                        .and_then(|r| parse_cell_ref(&r))
                        .unwrap_or((row, next_col));
                    next_col = position.1.saturating_add(1);
                    cell = Some(PendingCell {
                        position: Some(position),
                        kind: attr(e, b"t"),
                        ..Default::default()
                    });
                }
                b"v" => in_v = true,
                b"t" if cell.is_some() => in_inline_t = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"c" => {
                    next_col = attr(e, b"r")
                        .and_then(|r| parse_cell_ref(&r))
                        .map(|(_, c)| c + 1)
                        .unwrap_or(next_col.saturating_add(1));
                }
                b"row" => {
                    next_row = attr(e, b"r")
                        .and_then(|r| r.parse::<usize>().ok())
                        .unwrap_or(next_row.saturating_add(1));
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if let Some(c) = cell.as_mut() {
                    let text = String::from_utf8_lossy(e);
                    if in_v {
                        c.value.push_str(&text);
                    } else if in_inline_t {
                        c.inline.push_str(&text);
                    }
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if let (Some(c), Some(s)) = (cell.as_mut(), resolve_entity(&String::from_utf8_lossy(e))) {
                    if in_v {
                        c.value.push_str(&s);
                    } else if in_inline_t {
                        c.inline.push_str(&s);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_inline_t = false,
                b"c" => {
                    if let Some(done) = cell.take() {
                        insert_cell(&mut cells, &done, shared_strings);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    // A cell cut off by a parse error still counts.
    if let Some(done) = cell.take() {
        insert_cell(&mut cells, &done, shared_strings);
    }
    cells
}

fn insert_cell(cells: &mut BTreeMap<(usize, usize), String>, cell: &PendingCell, shared_strings: &[String]) {
    let Some(pos) = cell.position.filter(|p| in_sheet(*p)) else {
        return;
    };
    if let Some(value) = resolve_value(cell, shared_strings) {
        cells.insert(pos, value);
    }
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn cells_to_grid(cells: BTreeMap<(usize, usize), String>) -> Vec<Vec<String>> {
    let Some(max_row) = cells.keys().map(|(r, _)| *r).max() else {
        return Vec::new();
    };
    let mut grid: Vec<Vec<String>> = vec![Vec::new(); max_row + 1];
    for ((r, c), value) in cells {
        let row = &mut grid[r];
        if row.len() <= c {
            row.resize(c + 1, String::new());
        }
        row[c] = value;
    }
    grid
}
