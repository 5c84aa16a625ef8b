//! Purpose: Define the seam between request orchestration and the remote spreadsheet service.
//! Exports: `SheetsBackend`, `SheetTarget`, `Scope`.
//! Role: Implemented by `GoogleSheetsClient` (network) and `MemoryBackend` (tests, local runs).
//! Invariants: Implementations are `Send + Sync` and hold no per-request state.
//! Invariants: Write/clear results are relayed verbatim; the core never reshapes them.

use serde_json::Value;

use crate::core::grid::Grid;
use crate::core::range::{CellRange, qualified_range};

use super::ApiResult;
use super::accounts::Account;

/// Where a request reads or writes: document, sheet, and A1 range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetTarget {
    pub document_id: String,
    pub sheet_name: String,
    pub range: CellRange,
}

impl SheetTarget {
    pub fn new(document_id: impl Into<String>, sheet_name: impl Into<String>, range: CellRange) -> Self {
        Self {
            document_id: document_id.into(),
            sheet_name: sheet_name.into(),
            range,
        }
    }

    /// Range in the `Sheet!A1:B2` form the Sheets API expects.
    pub fn qualified_range(&self) -> String {
        qualified_range(&self.sheet_name, &self.range)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    ReadOnly,
    ReadWrite,
}

impl Scope {
    pub fn oauth_scope(self) -> &'static str {
        match self {
            Scope::ReadOnly => "https://www.googleapis.com/auth/spreadsheets.readonly",
            Scope::ReadWrite => "https://www.googleapis.com/auth/spreadsheets",
        }
    }
}

pub trait SheetsBackend: Send + Sync {
    fn fetch_range(&self, account: &Account, target: &SheetTarget) -> ApiResult<Grid>;

    fn write_range(&self, account: &Account, target: &SheetTarget, grid: &Grid) -> ApiResult<Value>;

    fn clear_range(&self, account: &Account, target: &SheetTarget) -> ApiResult<Value>;
}
