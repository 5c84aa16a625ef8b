//! Purpose: Turn JSON write bodies into cell grids (write direction).
//! Exports: `WriteShape`, `EncodeOptions`, `Encoded`, `classify`, `encode`, `parse_keys_seq`.
//! Role: Boundary decoder for POST bodies; the orchestrator only sees the closed `WriteShape` set.
//! Invariants: Shape is decided once from the outer JSON structure, before any encoding.
//! Invariants: Record/column shapes produce a rectangular grid whose row 0 is the header.
//! Invariants: An empty array is a clear directive and never produces a grid.
//! Notes: Cells are strings; numbers keep their JSON text, `null` becomes blank.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use super::error::{Error, ErrorKind};
use super::grid::{Grid, Record};
use super::keys::decorate_key;

/// Outer structure of a write body, already validated and converted to strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteShape {
    /// `[[...], [...]]`: written as-is.
    RowsOfValues(Grid),
    /// `[{...}, {...}]`: one row per record under a header row.
    RowsOfRecords(Vec<Record>),
    /// `{"key": [...], ...}`: one column per key under a header row.
    ColumnsOfValues(Vec<(String, Vec<String>)>),
    /// `[]`: clear the target range.
    Clear,
}

impl WriteShape {
    pub fn name(&self) -> &'static str {
        match self {
            WriteShape::RowsOfValues(_) => "rows-of-values",
            WriteShape::RowsOfRecords(_) => "rows-of-records",
            WriteShape::ColumnsOfValues(_) => "columns-of-values",
            WriteShape::Clear => "clear",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Explicit header order; `None` means first-seen order.
    pub keys_seq: Option<Vec<String>>,
    /// Uppercase header labels and turn `_` into spaces.
    pub decorate_keys: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoded {
    Grid(Grid),
    Clear,
}

/// Splits a `keys_seq` parameter (`"a, b,c"`) into an ordered, de-duplicated key list.
///
/// Returns `None` when no non-empty key remains.
pub fn parse_keys_seq(raw: &str) -> Option<Vec<String>> {
    let mut seen = HashSet::new();
    let keys: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .filter(|key| seen.insert(*key))
        .map(str::to_string)
        .collect();
    if keys.is_empty() { None } else { Some(keys) }
}

pub fn classify(body: Value) -> Result<WriteShape, Error> {
    match body {
        Value::Array(items) if items.is_empty() => Ok(WriteShape::Clear),
        Value::Array(items) => {
            let rows_mode = items[0].is_array();
            if !rows_mode && !items[0].is_object() {
                return Err(shape_error(format!("array of {}", plural(&items[0]))).with_index(0));
            }
            let mut grid = Vec::new();
            let mut records = Vec::new();
            for (idx, item) in items.into_iter().enumerate() {
                match item {
                    Value::Array(cells) if rows_mode => {
                        let row = cells
                            .into_iter()
                            .map(cell_text)
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(|err| err.with_index(idx))?;
                        grid.push(row);
                    }
                    Value::Object(map) if !rows_mode => {
                        records.push(object_to_record(map).map_err(|err| err.with_index(idx))?);
                    }
                    other => {
                        let expected = if rows_mode { "rows" } else { "records" };
                        return Err(shape_error(format!(
                            "array of {expected} mixed with {}",
                            describe(&other)
                        ))
                        .with_index(idx));
                    }
                }
            }
            if rows_mode {
                Ok(WriteShape::RowsOfValues(grid))
            } else {
                Ok(WriteShape::RowsOfRecords(records))
            }
        }
        Value::Object(map) => {
            let mut columns = Vec::with_capacity(map.len());
            for (col_idx, (key, value)) in map.into_iter().enumerate() {
                let Value::Array(cells) = value else {
                    return Err(shape_error(format!(
                        "object whose value for `{key}` is {}",
                        describe(&value)
                    ))
                    .with_index(col_idx));
                };
                let cells = cells
                    .into_iter()
                    .map(cell_text)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|err| err.with_index(col_idx))?;
                columns.push((key, cells));
            }
            Ok(WriteShape::ColumnsOfValues(columns))
        }
        other => Err(shape_error(describe(&other))),
    }
}

pub fn encode(shape: WriteShape, options: &EncodeOptions) -> Encoded {
    match shape {
        WriteShape::Clear => Encoded::Clear,
        WriteShape::RowsOfValues(grid) => Encoded::Grid(grid),
        WriteShape::RowsOfRecords(records) => {
            let keys = resolve_keys(
                options.keys_seq.as_deref(),
                records.iter().flat_map(Record::keys),
            );
            let mut positions: HashMap<&str, Vec<usize>> = HashMap::with_capacity(keys.len());
            for (idx, key) in keys.iter().enumerate() {
                positions.entry(key.as_str()).or_default().push(idx);
            }
            let mut grid = Vec::with_capacity(records.len() + 1);
            grid.push(header_row(&keys, options.decorate_keys));
            for record in &records {
                let mut row = vec![String::new(); keys.len()];
                for (key, value) in record.iter() {
                    for &idx in positions.get(key).into_iter().flatten() {
                        row[idx] = value.to_string();
                    }
                }
                grid.push(row);
            }
            Encoded::Grid(grid)
        }
        WriteShape::ColumnsOfValues(columns) => {
            let keys = resolve_keys(
                options.keys_seq.as_deref(),
                columns.iter().map(|(key, _)| key.as_str()),
            );
            let mut by_key: HashMap<&str, &Vec<String>> = HashMap::with_capacity(columns.len());
            for (name, cells) in &columns {
                by_key.entry(name.as_str()).or_insert(cells);
            }
            let selected: Vec<Option<&Vec<String>>> =
                keys.iter().map(|key| by_key.get(key.as_str()).copied()).collect();
            let height = selected
                .iter()
                .map(|cells| cells.map_or(0, Vec::len))
                .max()
                .unwrap_or(0);

            let mut grid = Vec::with_capacity(height + 1);
            grid.push(header_row(&keys, options.decorate_keys));
            for row_idx in 0..height {
                grid.push(
                    selected
                        .iter()
                        .map(|cells| {
                            cells
                                .and_then(|cells| cells.get(row_idx))
                                .cloned()
                                .unwrap_or_default()
                        })
                        .collect(),
                );
            }
            Encoded::Grid(grid)
        }
    }
}

fn resolve_keys<'a>(keys_seq: Option<&[String]>, seen: impl Iterator<Item = &'a str>) -> Vec<String> {
    if let Some(keys) = keys_seq {
        return keys.to_vec();
    }
    let mut known = HashSet::new();
    let mut keys = Vec::new();
    for key in seen {
        if known.insert(key) {
            keys.push(key.to_string());
        }
    }
    keys
}

fn header_row(keys: &[String], decorate: bool) -> Vec<String> {
    if decorate {
        keys.iter().map(|key| decorate_key(key)).collect()
    } else {
        keys.to_vec()
    }
}

fn object_to_record(map: Map<String, Value>) -> Result<Record, Error> {
    let mut record = Record::with_capacity(map.len());
    for (key, value) in map {
        let text = cell_text(value)?;
        record.push(key, text);
    }
    Ok(record)
}

fn cell_text(value: Value) -> Result<String, Error> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Number(number) => Ok(number.to_string()),
        nested @ (Value::Array(_) | Value::Object(_)) => {
            Err(shape_error(format!("cell holding {}", describe(&nested)))
                .with_hint("Cells must be strings, numbers, booleans, or null."))
        }
    }
}

fn shape_error(found: impl AsRef<str>) -> Error {
    Error::new(ErrorKind::InvalidPayloadShape)
        .with_message(format!("unrecognized payload shape: {}", found.as_ref()))
        .with_hint(
            "Send an array of arrays, an array of objects, an object of arrays, or [] to clear.",
        )
}

fn plural(value: &Value) -> &'static str {
    match value {
        Value::Null => "nulls",
        Value::Bool(_) => "booleans",
        Value::Number(_) => "numbers",
        Value::String(_) => "strings",
        Value::Array(_) => "arrays",
        Value::Object(_) => "objects",
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::{EncodeOptions, Encoded, WriteShape, classify, encode, parse_keys_seq};
    use crate::core::error::ErrorKind;
    use crate::core::grid::{DecodeOptions, Decoded, Grid, decode};
    use crate::core::keys;
    use serde_json::{Value, json};

    fn grid_of(encoded: Encoded) -> Grid {
        match encoded {
            Encoded::Grid(grid) => grid,
            Encoded::Clear => panic!("expected grid"),
        }
    }

    fn rows(value: Value) -> Grid {
        serde_json::from_value(value).expect("grid")
    }

    fn run(body: Value, options: &EncodeOptions) -> Grid {
        grid_of(encode(classify(body).expect("shape"), options))
    }

    #[test]
    fn classify_detects_each_shape() {
        assert_eq!(classify(json!([])).unwrap(), WriteShape::Clear);
        assert_eq!(classify(json!([["a"]])).unwrap().name(), "rows-of-values");
        assert_eq!(classify(json!([{"a": "1"}])).unwrap().name(), "rows-of-records");
        assert_eq!(classify(json!({"a": ["1"]})).unwrap().name(), "columns-of-values");
    }

    #[test]
    fn classify_rejects_unknown_shapes() {
        for body in [
            json!("text"),
            json!(12),
            json!(null),
            json!(true),
            json!([1, 2]),
            json!([["a"], {"b": "c"}]),
            json!({"a": "not a list"}),
        ] {
            let err = classify(body.clone()).expect_err("invalid shape");
            assert_eq!(err.kind(), ErrorKind::InvalidPayloadShape, "{body}");
            assert!(err.message().unwrap().starts_with("unrecognized payload shape"));
        }
    }

    #[test]
    fn classify_reports_position_of_bad_element() {
        let err = classify(json!([["a"], ["b"], 3])).expect_err("mixed");
        assert_eq!(err.index(), Some(2));
        let err = classify(json!([{"a": "1"}, {"a": {"nested": true}}])).expect_err("nested");
        assert_eq!(err.index(), Some(1));
        let err = classify(json!({"a": [], "b": 5})).expect_err("scalar column");
        assert_eq!(err.index(), Some(1));
        assert!(err.message().unwrap().contains("`b`"));
    }

    #[test]
    fn empty_array_is_clear() {
        let shape = classify(json!([])).unwrap();
        assert_eq!(encode(shape, &EncodeOptions::default()), Encoded::Clear);
    }

    #[test]
    fn rows_of_values_pass_through_with_string_cells() {
        let options = EncodeOptions {
            keys_seq: Some(vec!["ignored".to_string()]),
            decorate_keys: true,
        };
        let grid = run(json!([["a", 1, 2.5], [true, null], []]), &options);
        assert_eq!(grid, rows(json!([["a", "1", "2.5"], ["true", ""], []])));
    }

    #[test]
    fn columns_use_first_seen_order() {
        let body = json!({
            "column_1": ["value A2", "value A3"],
            "column_two": ["value B2", "value B3"],
        });
        let grid = run(body.clone(), &EncodeOptions::default());
        assert_eq!(
            grid,
            rows(json!([
                ["column_1", "column_two"],
                ["value A2", "value B2"],
                ["value A3", "value B3"],
            ]))
        );

        let decorated = run(
            body,
            &EncodeOptions {
                keys_seq: None,
                decorate_keys: true,
            },
        );
        assert_eq!(decorated[0], vec!["COLUMN 1", "COLUMN TWO"]);
        assert_eq!(decorated.len(), 3);
    }

    #[test]
    fn columns_keep_body_order_not_alphabetical() {
        let body: Value = serde_json::from_str(r#"{"zeta": ["1"], "alpha": ["2"]}"#).unwrap();
        let grid = run(body, &EncodeOptions::default());
        assert_eq!(grid[0], vec!["zeta", "alpha"]);
    }

    #[test]
    fn short_columns_pad_at_tail() {
        let body = json!({"a": ["1", "2", "3"], "b": ["x"], "c": []});
        let grid = run(body, &EncodeOptions::default());
        assert_eq!(
            grid,
            rows(json!([["a", "b", "c"], ["1", "x", ""], ["2", "", ""], ["3", "", ""]]))
        );
    }

    #[test]
    fn columns_follow_keys_seq() {
        let body = json!({"a": ["1"], "b": ["2"], "c": ["3"]});
        let options = EncodeOptions {
            keys_seq: Some(vec!["c".to_string(), "missing".to_string(), "a".to_string()]),
            decorate_keys: false,
        };
        let grid = run(body, &options);
        assert_eq!(grid, rows(json!([["c", "missing", "a"], ["3", "", "1"]])));
    }

    #[test]
    fn records_use_first_seen_order_across_rows() {
        let body = json!([
            {"b": "1", "a": "2"},
            {"c": "3", "a": "4"},
        ]);
        let grid = run(body, &EncodeOptions::default());
        assert_eq!(
            grid,
            rows(json!([["b", "a", "c"], ["1", "2", ""], ["", "4", "3"]]))
        );
    }

    #[test]
    fn records_follow_keys_seq_verbatim() {
        let body = json!([
            {"name": "Ann", "age": 31, "city": "Oslo"},
            {"name": "Bo"},
        ]);
        let options = EncodeOptions {
            keys_seq: parse_keys_seq("age, name, email"),
            decorate_keys: true,
        };
        let grid = run(body, &options);
        assert_eq!(
            grid,
            rows(json!([["AGE", "NAME", "EMAIL"], ["31", "Ann", ""], ["", "Bo", ""]]))
        );
    }

    #[test]
    fn record_grid_is_rectangular() {
        let body = json!([{"a": "1"}, {"b": "2", "c": "3"}, {}]);
        let grid = run(body, &EncodeOptions::default());
        assert_eq!(grid.len(), 4);
        assert!(grid.iter().all(|row| row.len() == 3));
    }

    #[test]
    fn wide_record_bodies_place_every_cell() {
        let keys: Vec<String> = (0..702).map(|idx| format!("k{idx}")).collect();
        let record: serde_json::Map<String, Value> = keys
            .iter()
            .rev()
            .map(|key| (key.clone(), Value::String(format!("v-{key}"))))
            .collect();
        let body = Value::Array(vec![Value::Object(record); 50]);
        let options = EncodeOptions {
            keys_seq: Some(keys.clone()),
            decorate_keys: false,
        };
        let grid = run(body, &options);
        assert_eq!(grid.len(), 51);
        assert_eq!(grid[0], keys);
        for row in &grid[1..] {
            assert_eq!(row.len(), 702);
            assert_eq!(row[0], "v-k0");
            assert_eq!(row[701], "v-k701");
        }
    }

    #[test]
    fn repeated_keys_seq_entries_fill_each_column() {
        let options = EncodeOptions {
            keys_seq: Some(vec!["a".to_string(), "b".to_string(), "a".to_string()]),
            decorate_keys: false,
        };
        let grid = run(json!([{"a": "1", "b": "2"}]), &options);
        assert_eq!(grid, rows(json!([["a", "b", "a"], ["1", "2", "1"]])));
        let grid = run(json!({"a": ["1"], "b": ["2"]}), &options);
        assert_eq!(grid, rows(json!([["a", "b", "a"], ["1", "2", "1"]])));
    }

    #[test]
    fn empty_object_encodes_to_empty_header() {
        let grid = run(json!({}), &EncodeOptions::default());
        assert_eq!(grid, vec![Vec::<String>::new()]);
    }

    #[test]
    fn keys_seq_parsing() {
        assert_eq!(
            parse_keys_seq(" a, b ,,c,a"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(parse_keys_seq(""), None);
        assert_eq!(parse_keys_seq(" , "), None);
    }

    #[test]
    fn records_round_trip_through_decode() {
        let header = ["Column 1", "Column two"];
        let keys = keys::normalize(&header);
        let body = json!([
            {"column_1": "value A2", "column_two": "value B2"},
            {"column_two": "value B3", "column_1": "value A3"},
        ]);
        let options = EncodeOptions {
            keys_seq: Some(keys),
            decorate_keys: false,
        };
        let grid = run(body, &options);
        let Decoded::Records(records) = decode(grid, DecodeOptions::default()) else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("column_1"), Some("value A2"));
        assert_eq!(records[0].get("column_two"), Some("value B2"));
        assert_eq!(records[1].get("column_1"), Some("value A3"));
        assert_eq!(records[1].get("column_two"), Some("value B3"));
    }
}
