use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::spreadsheet::ParsedSheet;

/// Upper bound on the estimated BSON size of one chunk's rows. MongoDB
/// rejects documents over 16 MiB.
pub const CHUNK_BUDGET: usize = 8 * 1024 * 1024;

/// One slice of a parse result persisted at upload time, keyed by the
/// on-disk file name and its position. Only chunk 0 carries the columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSheet {
    pub file_name: String,
    pub chunk: u32,
    #[serde(default)]
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub parsed_at: BsonDateTime,
}

/// Rough BSON encoding size of a JSON cell: type byte, element key and payload.
fn element_size(key_len: usize, value: &Value) -> usize {
    let payload = match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 8,
        Value::String(s) => s.len() + 5,
        Value::Array(items) => array_size(items),
        Value::Object(map) => 5 + map.iter().map(|(k, v)| element_size(k.len(), v)).sum::<usize>(),
    };
    1 + key_len + 1 + payload
}

fn array_size(items: &[Value]) -> usize {
    5 + items
        .iter()
        .enumerate()
        .map(|(i, v)| element_size(i.to_string().len(), v))
        .sum::<usize>()
}

impl StoredSheet {
    /// Splits `sheet` into chunk documents that each stay under [`CHUNK_BUDGET`].
    /// An empty sheet still yields chunk 0 so its columns are kept.
    pub fn chunks(file_name: &str, sheet: &ParsedSheet) -> Vec<StoredSheet> {
        let parsed_at = BsonDateTime::now();
        let chunk = |index: usize, rows: Vec<Vec<Value>>| StoredSheet {
            file_name: file_name.to_string(),
            chunk: index as u32,
            columns: if index == 0 { sheet.columns.clone() } else { Vec::new() },
            rows,
            parsed_at,
        };

        let mut chunks = Vec::new();
        let mut rows = Vec::new();
        let mut size = 0;
        for row in &sheet.rows {
            let row_size = 2 + rows.len().to_string().len() + array_size(row);
            if !rows.is_empty() && size + row_size > CHUNK_BUDGET {
                chunks.push(chunk(chunks.len(), std::mem::take(&mut rows)));
                size = 0;
            }
            size += row_size;
            rows.push(row.clone());
        }
        if !rows.is_empty() || chunks.is_empty() {
            chunks.push(chunk(chunks.len(), rows));
        }
        chunks
    }

    /// Rebuilds a parse result from its chunks. Returns `None` when the set
    /// is empty or has a gap, which means it was only partly stored.
    pub fn assemble(mut chunks: Vec<StoredSheet>) -> Option<ParsedSheet> {
        chunks.sort_by_key(|c| c.chunk);
        if chunks.is_empty() || chunks.iter().enumerate().any(|(i, c)| c.chunk as usize != i) {
            return None;
        }

        let mut sheet = ParsedSheet::default();
        for (i, stored) in chunks.into_iter().enumerate() {
            if i == 0 {
                sheet.columns = stored.columns;
            }
            sheet.rows.extend(stored.rows);
        }
        Some(sheet)
    }
}
