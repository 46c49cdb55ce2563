//! Spreadsheet adapter: reads the first worksheet of an `.xls`/`.xlsx`
//! file into header + row arrays, and writes tabular data back out as
//! `.xlsx` or CSV.

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::path::Path;

use crate::utils::AppError;

/// Number of data rows returned in an upload preview.
pub const PREVIEW_ROWS: usize = 10;

/// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// First worksheet of a workbook: the header row plus the data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSheet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ParsedSheet {
    /// Data rows, header excluded.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn preview(&self) -> Vec<Vec<Value>> {
        self.rows.iter().take(PREVIEW_ROWS).cloned().collect()
    }

    /// Zips the header row against every data row by position.
    ///
    /// A repeated header name overwrites the earlier value (the key keeps
    /// its first position); cells missing from short rows become `null`.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Map::with_capacity(self.columns.len());
                for (idx, column) in self.columns.iter().enumerate() {
                    let value = row.get(idx).cloned().unwrap_or(Value::Null);
                    record.insert(column.clone(), value);
                }
                record
            })
            .collect()
    }
}

pub fn parse_file(path: &Path) -> Result<ParsedSheet, AppError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| AppError::parse("Failed to parse file", e))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| AppError::parse("Failed to parse file", e))?,
        None => return Ok(ParsedSheet::default()),
    };

    let mut rows = range.rows().map(|row| {
        let mut values: Vec<Value> = row.iter().map(cell_to_json).collect();
        while matches!(values.last(), Some(Value::Null)) {
            values.pop();
        }
        values
    });

    let columns = rows
        .next()
        .map(|header| header.iter().map(header_name).collect())
        .unwrap_or_default();

    Ok(ParsedSheet {
        columns,
        rows: rows.collect(),
    })
}

fn cell_to_json(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => number_to_json(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::String(s.clone()),
        // Dates are reported as Excel serial numbers, like any other numeric cell.
        Data::DateTime(dt) => number_to_json(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(e.to_string()),
    }
}

fn number_to_json(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn header_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Column order for a list of records: keys in order of first appearance.
pub fn record_columns(records: &[Map<String, Value>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

pub fn write_csv(columns: &[String], rows: &[Vec<Value>]) -> String {
    let mut csv_content = String::new();

    let header: Vec<String> = columns.iter().map(|c| escape_csv(c)).collect();
    csv_content.push_str(&header.join(","));
    csv_content.push('\n');

    for row in rows {
        let line: Vec<String> = (0..columns.len())
            .map(|idx| escape_csv(&cell_text(row.get(idx).unwrap_or(&Value::Null))))
            .collect();
        csv_content.push_str(&line.join(","));
        csv_content.push('\n');
    }

    csv_content
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Single-sheet workbook with the given header row; blocking.
pub fn write_xlsx(sheet_name: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<Vec<u8>, AppError> {
    let failed = |e: rust_xlsxwriter::XlsxError| AppError::internal("Failed to export data", e);

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name(sheet_name).map_err(failed)?;

    for (col, name) in columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name.as_str()).map_err(failed)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let excel_row = (r + 1) as u32;
        for (c, value) in row.iter().enumerate().take(columns.len()) {
            let col = c as u16;
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    worksheet.write_boolean(excel_row, col, *b).map_err(failed)?;
                }
                Value::Number(n) => {
                    let number = n.as_f64().unwrap_or_default();
                    worksheet.write_number(excel_row, col, number).map_err(failed)?;
                }
                Value::String(s) => {
                    worksheet.write_string(excel_row, col, s.as_str()).map_err(failed)?;
                }
                other => {
                    worksheet.write_string(excel_row, col, &other.to_string()).map_err(failed)?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer().map_err(failed)
}
