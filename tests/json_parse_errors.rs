//! Purpose: Regression coverage for parse-failure category mapping.
//! Exports: Integration tests only.
//! Invariants: Hints never contain payload text.
//! Notes: Uses source include to exercise internal helper logic without widening API surface.

#[path = "../src/json/parse.rs"]
mod parse;

use parse::ParseFailureCategory;
use serde_json::Value;

#[test]
fn category_mapping_handles_syntax_and_eof_errors() {
    let syntax_err = parse::from_slice::<Value>(br#"{"a":}"#).unwrap_err();
    assert_eq!(
        parse::categorize_error(&syntax_err),
        ParseFailureCategory::Syntax
    );

    let eof_err = parse::from_slice::<Value>(br#"[["a", "b"]"#).unwrap_err();
    assert_eq!(parse::categorize_error(&eof_err), ParseFailureCategory::Eof);
}

#[test]
fn category_mapping_handles_data_errors() {
    let data_err = parse::from_slice::<Vec<Vec<String>>>(br#"[[1]]"#).unwrap_err();
    assert_eq!(
        parse::categorize_error(&data_err),
        ParseFailureCategory::Data
    );
}

#[test]
fn hint_contains_category_and_context_but_not_payload() {
    let err = parse::from_slice::<Value>(br#"{"secret": tru}"#).unwrap_err();
    let hint = parse::hint_for_error(&err, "request body");
    assert!(hint.contains("parse category: syntax"));
    assert!(hint.contains("context: request body"));
    assert!(!hint.contains("secret"));
}
