//! Purpose: Internal JSON parsing boundary shared by the HTTP server and CLI.
//! Exports: `parse` module with decode helpers and failure categorization.
//! Role: Single seam so request bodies and CLI inputs decode the same way.
//! Invariants: Helper APIs stay small and deterministic (no hidden global state).

pub(crate) mod parse;
