//! Purpose: Validate A1 range expressions and build sheet-qualified ranges.
//! Exports: `CellRange`, `DEFAULT_RANGE`, `qualified_range`, `column_letters`.
//! Invariants: Columns are 1-3 letters no larger than `ZZZ`; rows are positive.
//! Invariants: Sheet names outside `[A-Za-z0-9_]` are quoted with `'` doubled.

use std::fmt;
use std::str::FromStr;

use super::error::{Error, ErrorKind};

pub const DEFAULT_RANGE: &str = "A1:ZZ10000";

const MAX_COLUMN: u32 = 18_278;

/// One end of a range. At least one of column/row is present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRef {
    /// 1-based column index.
    pub column: Option<u32>,
    /// 1-based row index.
    pub row: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellRange {
    text: String,
    pub start: CellRef,
    pub end: Option<CellRef>,
}

impl CellRange {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let text = input.trim();
        if text.is_empty() {
            return Err(range_error(input, "range is empty"));
        }
        let (start, end) = match text.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (text, None),
        };
        let start = parse_cell(start).map_err(|reason| range_error(input, reason))?;
        let end = end
            .map(parse_cell)
            .transpose()
            .map_err(|reason| range_error(input, reason))?;
        if end.is_none() && (start.column.is_none() || start.row.is_none()) {
            return Err(range_error(input, "a single cell needs both column and row"));
        }
        if let Some(end) = end {
            // `A:1` mixes a column-only and a row-only end.
            let start_kind = (start.column.is_some(), start.row.is_some());
            let end_kind = (end.column.is_some(), end.row.is_some());
            if matches!(
                (start_kind, end_kind),
                ((true, false), (false, true)) | ((false, true), (true, false))
            ) {
                return Err(range_error(input, "range ends mix column-only and row-only"));
            }
        }
        Ok(Self {
            text: text.to_ascii_uppercase(),
            start,
            end,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Default for CellRange {
    fn default() -> Self {
        Self {
            text: DEFAULT_RANGE.to_string(),
            start: CellRef {
                column: Some(1),
                row: Some(1),
            },
            end: Some(CellRef {
                column: Some(702),
                row: Some(10_000),
            }),
        }
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// `Sheet1!A1:B2`, quoting the sheet name when needed.
pub fn qualified_range(sheet: &str, range: &CellRange) -> String {
    let plain = !sheet.is_empty()
        && sheet
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if plain {
        format!("{sheet}!{range}")
    } else {
        format!("'{}'!{range}", sheet.replace('\'', "''"))
    }
}

/// 1-based column index to its letter form (`1` → `A`, `27` → `AA`).
pub fn column_letters(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

fn parse_cell(input: &str) -> Result<CellRef, &'static str> {
    let mut chars = input.chars().peekable();
    if chars.peek() == Some(&'$') {
        chars.next();
    }

    let mut letters = String::new();
    while let Some(&ch) = chars.peek() {
        if !ch.is_ascii_alphabetic() {
            break;
        }
        letters.push(ch);
        chars.next();
    }

    if chars.peek() == Some(&'$') {
        if letters.is_empty() {
            return Err("misplaced `$` anchor");
        }
        chars.next();
    }

    let mut digits = String::new();
    for ch in chars {
        if !ch.is_ascii_digit() {
            return Err("unexpected character in cell reference");
        }
        digits.push(ch);
    }

    if letters.is_empty() && digits.is_empty() {
        return Err("empty cell reference");
    }

    let column = if letters.is_empty() {
        None
    } else {
        Some(column_index(&letters).ok_or("column is out of range")?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        match digits.parse::<u32>() {
            Ok(row) if row > 0 => Some(row),
            _ => return Err("row must be a positive number"),
        }
    };
    Ok(CellRef { column, row })
}

fn column_index(letters: &str) -> Option<u32> {
    if letters.len() > 3 {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        let v = (ch.to_ascii_uppercase() as u32).checked_sub('A' as u32)?;
        if v >= 26 {
            return None;
        }
        col = col * 26 + v + 1;
    }
    (col <= MAX_COLUMN).then_some(col)
}

fn range_error(input: &str, reason: &str) -> Error {
    Error::new(ErrorKind::MalformedRange)
        .with_message(format!("malformed range `{input}`: {reason}"))
        .with_hint("Use A1 notation such as A1:ZZ10000, A:C, or 2:10.")
}
