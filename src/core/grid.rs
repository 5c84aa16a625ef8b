//! Purpose: Convert raw cell grids into JSON records (read direction).
//! Exports: `Grid`, `Record`, `DecodeOptions`, `Decoded`, `decode`, `is_end_marker`.
//! Role: Core of the read path between the backend fetch and filtering.
//! Invariants: Row order from the backend is preserved in the output.
//! Invariants: Record fields follow header order; short rows pad with blank, long rows truncate.
//! Invariants: Values mode returns the grid untouched, header row included.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use super::keys;

/// Ordered rows of ordered string cells. Rows may be ragged; blank cells are `""`.
pub type Grid = Vec<Vec<String>>;

/// Cell text that marks an end-of-table row when `break_if_na` is set.
pub const NA_MARKER: &str = "#N/A";

/// One data row keyed by normalized header keys, in header order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Appends a field. Callers guarantee key uniqueness (see `keys::normalize`).
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let map = self
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        Value::Object(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Return the raw grid instead of records.
    pub values_mode: bool,
    /// Emit the header row itself as the first record.
    pub include_first_row: bool,
    /// Stop at the first end-of-table marker row (see `is_end_marker`).
    pub break_if_na: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Values(Grid),
    Records(Vec<Record>),
}

impl Decoded {
    pub fn len(&self) -> usize {
        match self {
            Decoded::Values(grid) => grid.len(),
            Decoded::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Value {
        match self {
            Decoded::Values(grid) => Value::Array(
                grid.iter()
                    .map(|row| Value::Array(row.iter().cloned().map(Value::String).collect()))
                    .collect(),
            ),
            Decoded::Records(records) => {
                Value::Array(records.iter().map(Record::to_json).collect())
            }
        }
    }
}

pub fn decode(grid: Grid, options: DecodeOptions) -> Decoded {
    if options.values_mode {
        return Decoded::Values(grid);
    }

    let mut rows = grid.into_iter();
    let Some(header) = rows.next() else {
        return Decoded::Records(Vec::new());
    };
    let keys = keys::normalize(&header);

    let mut records = Vec::new();
    if options.include_first_row {
        records.push(row_to_record(&keys, &header));
    }
    for row in rows {
        if options.break_if_na && is_end_marker(&row) {
            break;
        }
        records.push(row_to_record(&keys, &row));
    }
    Decoded::Records(records)
}

/// A row that ends the table: every cell blank, or any cell equal to `#N/A`.
pub fn is_end_marker<S: AsRef<str>>(row: &[S]) -> bool {
    let mut all_blank = true;
    for cell in row {
        let cell = cell.as_ref();
        if cell == NA_MARKER {
            return true;
        }
        if !cell.is_empty() {
            all_blank = false;
        }
    }
    all_blank
}

fn row_to_record(keys: &[String], row: &[String]) -> Record {
    let mut record = Record::with_capacity(keys.len());
    for (idx, key) in keys.iter().enumerate() {
        let value = row.get(idx).map(String::as_str).unwrap_or_default();
        record.push(key.clone(), value);
    }
    record
}
