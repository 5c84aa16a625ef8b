//! Purpose: Shared library crate behind the `sheetjson` server and CLI.
//! Exports: `core` (grid codecs, keys, filters, ranges, errors), `api` (accounts, backends, requests), `serve`.
//! Role: Internal library backing the binary and integration tests.
//! Invariants: `core` is pure; filesystem and network access live in `api` and `serve`.
pub mod api;
pub mod core;
pub(crate) mod json;
pub mod serve;
