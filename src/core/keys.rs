//! Purpose: Derive JSON record keys from spreadsheet header cells.
//! Exports: `normalize`, `normalize_key`, `decorate_key`.
//! Role: Leaf of the read path; GridCodec and request parsing depend on it.
//! Invariants: `normalize` is length-preserving and 1:1 with header positions.
//! Invariants: Output keys are pairwise distinct, non-empty, and within `[a-z0-9_]`.
//! Invariants: Two header columns never share a key (no silent merges).

use std::collections::{HashMap, HashSet};

/// Normalizes one header cell: lowercase, spaces to `_`, drop anything outside `[a-z0-9_]`.
///
/// May return an empty string; `normalize` takes care of replacing those.
pub fn normalize_key(cell: &str) -> String {
    cell.chars()
        .flat_map(char::to_lowercase)
        .map(|ch| if ch == ' ' { '_' } else { ch })
        .filter(|ch| matches!(ch, 'a'..='z' | '0'..='9' | '_'))
        .collect()
}

/// Turns a header row into unique record keys.
///
/// Every position whose candidate is empty, or shared with another position, is
/// replaced by `column{N}` (1-based). All members of a colliding group are
/// replaced, including the first occurrence, so no column is privileged by order.
pub fn normalize<S: AsRef<str>>(header: &[S]) -> Vec<String> {
    let candidates: Vec<String> = header
        .iter()
        .map(|cell| normalize_key(cell.as_ref()))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for candidate in &candidates {
        *counts.entry(candidate.as_str()).or_default() += 1;
    }

    let keep: Vec<bool> = candidates
        .iter()
        .map(|candidate| !candidate.is_empty() && counts[candidate.as_str()] == 1)
        .collect();

    let mut taken: HashSet<String> = candidates
        .iter()
        .zip(&keep)
        .filter(|(_, keep)| **keep)
        .map(|(candidate, _)| candidate.clone())
        .collect();

    candidates
        .into_iter()
        .zip(keep)
        .enumerate()
        .map(|(idx, (candidate, keep))| {
            if keep {
                return candidate;
            }
            // A real header may already be named like a synthetic key.
            let mut synthetic = format!("column{}", idx + 1);
            while taken.contains(&synthetic) {
                synthetic.push('_');
            }
            taken.insert(synthetic.clone());
            synthetic
        })
        .collect()
}

/// Header label used on write when `decorate_keys` is set: `"column_two"` -> `"COLUMN TWO"`.
pub fn decorate_key(key: &str) -> String {
    key.to_uppercase().replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::{decorate_key, normalize, normalize_key};
    use std::collections::HashSet;

    #[test]
    fn normalize_key_lowercases_and_strips() {
        assert_eq!(normalize_key("Column 1"), "column_1");
        assert_eq!(normalize_key("Hello, World!"), "hello_world");
        assert_eq!(normalize_key("E-mail (work)"), "email_work");
        assert_eq!(normalize_key("already_ok_9"), "already_ok_9");
        assert_eq!(normalize_key("Ünïcode"), "ncode");
        assert_eq!(normalize_key("!!!"), "");
    }

    #[test]
    fn distinct_headers_keep_their_candidates() {
        let keys = normalize(&["Column 1", "Column two"]);
        assert_eq!(keys, vec!["column_1", "column_two"]);
    }

    #[test]
    fn colliding_headers_all_become_synthetic() {
        let keys = normalize(&["Col!", "Col?"]);
        assert_eq!(keys, vec!["column1", "column2"]);
    }

    #[test]
    fn collision_only_rewrites_the_colliding_group() {
        let keys = normalize(&["Name", "Col!", "Age", "Col?"]);
        assert_eq!(keys, vec!["name", "column2", "age", "column4"]);
    }

    #[test]
    fn empty_headers_become_synthetic() {
        let keys = normalize(&["id", "", "???", "value"]);
        assert_eq!(keys, vec!["id", "column2", "column3", "value"]);
    }

    #[test]
    fn synthetic_key_never_shadows_real_header() {
        let keys = normalize(&["column2", "", ""]);
        assert_eq!(keys, vec!["column2", "column2_", "column3"]);
    }

    #[test]
    fn output_is_unique_non_empty_and_length_preserving() {
        let headers = [
            "", "", "A", "a", "column1", "b c", "b_c", "x", "column5", "!", "Z",
        ];
        let keys = normalize(&headers);
        assert_eq!(keys.len(), headers.len());
        assert!(keys.iter().all(|key| !key.is_empty()));
        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
        assert!(
            keys.iter()
                .all(|key| key.chars().all(|ch| matches!(ch, 'a'..='z' | '0'..='9' | '_')))
        );
    }

    #[test]
    fn empty_header_row_yields_no_keys() {
        let keys = normalize::<&str>(&[]);
        assert!(keys.is_empty());
    }

    #[test]
    fn decorate_key_uppercases_and_spaces() {
        assert_eq!(decorate_key("column_1"), "COLUMN 1");
        assert_eq!(decorate_key("column_two"), "COLUMN TWO");
        assert_eq!(decorate_key("plain"), "PLAIN");
    }
}
