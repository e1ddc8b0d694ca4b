//! Tabular view of a [`ResultCollection`]: one row per document, one column
//! per key seen in any record.

use crate::{FinancialRecord, ResultCollection};

/// Column used for parsed output that is not a JSON object.
pub const VALUE_COLUMN: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub label: String,
    /// One cell per column; `None` where the record lacks that key.
    pub cells: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Key/value pairs of a record in its own key order.
fn record_fields(record: &FinancialRecord) -> Vec<(String, String)> {
    match record {
        FinancialRecord::Fallback(f) => vec![
            ("error".to_string(), f.error.clone()),
            ("raw_response".to_string(), f.raw_response.clone()),
        ],
        FinancialRecord::Parsed(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), cell_text(v)))
            .collect(),
        FinancialRecord::Parsed(other) => vec![(VALUE_COLUMN.to_string(), cell_text(other))],
    }
}

impl ResultTable {
    /// Build the table. Columns are the union of record keys in the order
    /// they are first seen.
    pub fn from_collection(results: &ResultCollection) -> Self {
        let per_row: Vec<(&str, Vec<(String, String)>)> = results
            .iter()
            .map(|(label, record)| (label, record_fields(record)))
            .collect();

        let mut columns: Vec<String> = Vec::new();
        for (_, fields) in &per_row {
            for (key, _) in fields {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = per_row
            .into_iter()
            .map(|(label, fields)| TableRow {
                label: label.to_string(),
                cells: columns
                    .iter()
                    .map(|col| {
                        fields
                            .iter()
                            .find(|(k, _)| k == col)
                            .map(|(_, v)| v.clone())
                    })
                    .collect(),
            })
            .collect();

        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
