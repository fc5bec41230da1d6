//! Row input files: Excel workbooks, CSV with a header row, or a JSON array
//! of objects

use anyhow::{Context, Result, bail};
use calamine::{Data, Reader, open_workbook_auto};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::types::RowRecord;

/// Read every non-empty row, keeping column order
///
/// `sheet` picks a worksheet by name in a workbook; the first sheet is used
/// when it is `None`. Other formats ignore it.
pub fn read_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<RowRecord>> {
    if !path.exists() {
        bail!("Data file does not exist: {}", path.display());
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let rows = match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(path, sheet)?,
        "csv" => read_csv(path)?,
        "json" => read_json(path)?,
        other => bail!(
            "Unsupported data file format '.{}' (expected .xlsx, .xls, .csv or .json)",
            other
        ),
    };

    info!("Read {} row(s) from {}", rows.len(), path.display());
    Ok(rows)
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<Vec<RowRecord>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let sheet = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .with_context(|| format!("{} has no worksheets", path.display()))?,
    };
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("Failed to read sheet '{}' of {}", sheet, path.display()))?;

    let mut lines = range.rows();
    let Some(header_row) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| workbook_cell(cell).trim().to_string())
        .collect();
    debug!("Columns in sheet '{}': {:?}", sheet, headers);

    let mut rows = Vec::new();
    for line in lines {
        if line.iter().all(|cell| workbook_cell(cell).is_empty()) {
            continue;
        }

        // Formatted but unnamed trailing columns carry no field
        let row: RowRecord = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(i, header)| {
                let value = line.get(i).map(workbook_cell).unwrap_or_default();
                (header.clone(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn workbook_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => whole_number(*f).unwrap_or_else(|| f.to_string()),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn read_csv(path: &Path) -> Result<Vec<RowRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read the header row of {}", path.display()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    debug!("Columns: {:?}", headers);

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Malformed CSV record at data line {}", line + 1))?;

        // Skip blank lines and rows of empty cells
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let row: RowRecord = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                (
                    header.clone(),
                    record.get(i).unwrap_or("").trim().to_string(),
                )
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn read_json(path: &Path) -> Result<Vec<RowRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let body: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let Value::Array(items) = body else {
        bail!("{} must contain a JSON array of objects", path.display());
    };

    let mut rows = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let Value::Object(fields) = item else {
            bail!("Row {} of {} is not a JSON object", i + 1, path.display());
        };

        let row: RowRecord = fields
            .into_iter()
            .map(|(key, value)| (key, cell_text(&value)))
            .collect();
        if row.iter().all(|(_, v)| v.trim().is_empty()) {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Spreadsheet exports write whole numbers as `3.0` and blanks as `null`
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n
            .as_f64()
            .filter(|_| n.is_f64())
            .and_then(whole_number)
            .unwrap_or_else(|| n.to_string()),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn whole_number(f: f64) -> Option<String> {
    (f.fract() == 0.0 && f.abs() < 1e15).then(|| format!("{}", f as i64))
}
