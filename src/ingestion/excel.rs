//! Spreadsheet-container reading via `calamine`.
//!
//! The first worksheet is converted into a string grid whose row indexes are absolute sheet rows
//! (leading blank rows are kept), so a descriptor's header offset means the same thing for a
//! workbook as for a delimited export.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::error::{ReconcileError, ReconcileResult};

/// Read the first worksheet of an in-memory workbook.
///
/// Fails with [`ReconcileError::Excel`] when the container is rejected by the reader, or
/// [`ReconcileError::ContainerCorrupt`] when it has no worksheet.
pub fn read_first_sheet(file: &str, bytes: &[u8]) -> ReconcileResult<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ReconcileError::ContainerCorrupt {
            file: file.to_string(),
            message: "workbook has no sheets".to_string(),
        })??;

    let (start_row, start_col) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut grid: Vec<Vec<String>> = vec![Vec::new(); start_row];
    for row in range.rows() {
        let mut out = vec![String::new(); start_col];
        out.extend(row.iter().map(cell_to_string));
        grid.push(out);
    }
    Ok(grid)
}

/// Render a cell the way a user sees it in the sheet; integral floats lose their `.0`.
fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}
