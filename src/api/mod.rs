//! Purpose: Define the public request-handling surface for sheetjson.
//! Exports: Account registry, sheet backends, request orchestration, and error types.
//! Role: Public boundary used by the HTTP server, CLI, and integration tests.
//! Invariants: Backends are reached only through `SheetsBackend`.
//! Invariants: Internal modules remain private and are re-exported selectively.

mod accounts;
mod backend;
mod google;
mod memory;
mod oauth;
mod request;

pub use crate::core::error::{Error, ErrorKind, to_exit_code, to_http_status};
pub use crate::core::range::{CellRange, DEFAULT_RANGE};
pub use accounts::{Account, AccountStore, ServiceAccountKey, default_accounts_dir};
pub use backend::{Scope, SheetTarget, SheetsBackend};
pub use google::{DEFAULT_ENDPOINT, GoogleSheetsClient};
pub use memory::{BackendCall, MemoryBackend};
pub use oauth::{fetch_access_token, signed_assertion};
pub use request::{
    DEFAULT_ACCOUNT, ReadRequest, SheetService, WriteRequest, first_param, parse_body, parse_bool,
};

pub type ApiResult<T> = Result<T, Error>;
