//! Purpose: In-process spreadsheet store implementing `SheetsBackend`.
//! Exports: `MemoryBackend`, `BackendCall`.
//! Role: Drives HTTP and orchestration tests without network access or credentials.
//! Invariants: Reads clip to the requested range and drop trailing blank cells/rows, like the Sheets API.
//! Invariants: Unknown documents or sheets are `NotFound`; unshared documents are `Permission`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use serde_json::{Value, json};

use crate::core::error::{Error, ErrorKind};
use crate::core::grid::Grid;
use crate::core::range::{CellRange, column_letters, qualified_range};

use super::ApiResult;
use super::accounts::Account;
use super::backend::{SheetTarget, SheetsBackend};

/// One backend invocation, recorded for assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    Fetch { account: String, range: String },
    Write { account: String, range: String, grid: Grid },
    Clear { account: String, range: String },
}

#[derive(Default)]
struct Document {
    sheets: HashMap<String, Grid>,
    shared_with: Option<BTreeSet<String>>,
}

#[derive(Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<String, Document>>,
    calls: Mutex<Vec<BackendCall>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(self, document_id: &str, sheet_name: &str, grid: Grid) -> Self {
        self.insert_sheet(document_id, sheet_name, grid);
        self
    }

    /// Restricts a document to the given service-account emails.
    pub fn with_shared(self, document_id: &str, client_emails: &[&str]) -> Self {
        let mut documents = self.documents.lock().expect("lock");
        documents.entry(document_id.to_string()).or_default().shared_with =
            Some(client_emails.iter().map(|email| email.to_string()).collect());
        drop(documents);
        self
    }

    pub fn insert_sheet(&self, document_id: &str, sheet_name: &str, grid: Grid) {
        let mut documents = self.documents.lock().expect("lock");
        documents
            .entry(document_id.to_string())
            .or_default()
            .sheets
            .insert(sheet_name.to_string(), grid);
    }

    /// Current contents of a sheet, if it exists.
    pub fn sheet(&self, document_id: &str, sheet_name: &str) -> Option<Grid> {
        let documents = self.documents.lock().expect("lock");
        documents
            .get(document_id)
            .and_then(|doc| doc.sheets.get(sheet_name))
            .cloned()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().expect("lock").clone()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().expect("lock").push(call);
    }

    fn with_sheet_mut<R>(
        &self,
        account: &Account,
        target: &SheetTarget,
        f: impl FnOnce(&mut Grid) -> R,
    ) -> ApiResult<R> {
        let mut documents = self.documents.lock().expect("lock");
        let document = documents.get_mut(&target.document_id).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("document `{}` not found", target.document_id))
        })?;
        if let Some(shared) = &document.shared_with {
            if !shared.contains(&account.key().client_email) {
                return Err(Error::new(ErrorKind::Permission)
                    .with_message("sheet is not shared with service account"));
            }
        }
        let grid = document.sheets.get_mut(&target.sheet_name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("sheet `{}` not found", target.sheet_name))
        })?;
        Ok(f(grid))
    }
}

impl SheetsBackend for MemoryBackend {
    fn fetch_range(&self, account: &Account, target: &SheetTarget) -> ApiResult<Grid> {
        self.record(BackendCall::Fetch {
            account: account.name().to_string(),
            range: target.qualified_range(),
        });
        let bounds = Bounds::of(&target.range);
        self.with_sheet_mut(account, target, |grid| {
            let mut out: Grid = grid
                .iter()
                .enumerate()
                .filter(|(row_idx, _)| bounds.contains_row(*row_idx))
                .map(|(_, row)| {
                    let mut cells: Vec<String> = row
                        .iter()
                        .enumerate()
                        .filter(|(col_idx, _)| bounds.contains_column(*col_idx))
                        .map(|(_, cell)| cell.clone())
                        .collect();
                    while cells.last().is_some_and(String::is_empty) {
                        cells.pop();
                    }
                    cells
                })
                .collect();
            while out.last().is_some_and(Vec::is_empty) {
                out.pop();
            }
            out
        })
    }

    fn write_range(&self, account: &Account, target: &SheetTarget, values: &Grid) -> ApiResult<Value> {
        self.record(BackendCall::Write {
            account: account.name().to_string(),
            range: target.qualified_range(),
            grid: values.clone(),
        });
        let bounds = Bounds::of(&target.range);
        let width = values.iter().map(Vec::len).max().unwrap_or(0);
        self.with_sheet_mut(account, target, |grid| {
            for (row_offset, row) in values.iter().enumerate() {
                let row_idx = bounds.first_row + row_offset;
                if grid.len() <= row_idx {
                    grid.resize_with(row_idx + 1, Vec::new);
                }
                let dest = &mut grid[row_idx];
                for (col_offset, cell) in row.iter().enumerate() {
                    let col_idx = bounds.first_column + col_offset;
                    if dest.len() <= col_idx {
                        dest.resize(col_idx + 1, String::new());
                    }
                    dest[col_idx] = cell.clone();
                }
            }
        })?;

        let cells: usize = values.iter().map(Vec::len).sum();
        let updated_range = if values.is_empty() || width == 0 {
            target.qualified_range()
        } else {
            let written = format!(
                "{}{}:{}{}",
                column_letters(bounds.first_column as u32 + 1),
                bounds.first_row + 1,
                column_letters((bounds.first_column + width) as u32),
                bounds.first_row + values.len()
            );
            match CellRange::parse(&written) {
                Ok(range) => qualified_range(&target.sheet_name, &range),
                Err(_) => target.qualified_range(),
            }
        };
        Ok(json!({
            "spreadsheetId": target.document_id,
            "updatedRange": updated_range,
            "updatedRows": values.len(),
            "updatedColumns": width,
            "updatedCells": cells,
        }))
    }

    fn clear_range(&self, account: &Account, target: &SheetTarget) -> ApiResult<Value> {
        self.record(BackendCall::Clear {
            account: account.name().to_string(),
            range: target.qualified_range(),
        });
        let bounds = Bounds::of(&target.range);
        self.with_sheet_mut(account, target, |grid| {
            for (row_idx, row) in grid.iter_mut().enumerate() {
                if !bounds.contains_row(row_idx) {
                    continue;
                }
                for (col_idx, cell) in row.iter_mut().enumerate() {
                    if bounds.contains_column(col_idx) {
                        cell.clear();
                    }
                }
            }
        })?;
        Ok(json!({
            "spreadsheetId": target.document_id,
            "clearedRange": target.qualified_range(),
        }))
    }
}

/// 0-based inclusive window; `None` means unbounded.
struct Bounds {
    first_column: usize,
    first_row: usize,
    last_column: Option<usize>,
    last_row: Option<usize>,
}

impl Bounds {
    fn of(range: &CellRange) -> Self {
        let first_column = range.start.column.map_or(0, |col| col as usize - 1);
        let first_row = range.start.row.map_or(0, |row| row as usize - 1);
        let (last_column, last_row) = match range.end {
            Some(end) => (
                end.column.map(|col| col as usize - 1),
                end.row.map(|row| row as usize - 1),
            ),
            None => (Some(first_column), Some(first_row)),
        };
        Self {
            first_column,
            first_row,
            last_column,
            last_row,
        }
    }

    fn contains_row(&self, row_idx: usize) -> bool {
        row_idx >= self.first_row && self.last_row.map_or(true, |last| row_idx <= last)
    }

    fn contains_column(&self, col_idx: usize) -> bool {
        col_idx >= self.first_column && self.last_column.map_or(true, |last| col_idx <= last)
    }
}
