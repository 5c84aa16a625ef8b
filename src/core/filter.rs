//! Purpose: Equality filters over decoded records.
//! Exports: `Filter`, `apply`, `matches_all`.
//! Invariants: Filters are ANDed; comparison is exact string equality (no coercion).
//! Invariants: A key absent from a record never matches; output keeps input order.

use super::grid::Record;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub key: String,
    pub value: String,
}

impl Filter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.get(&self.key) == Some(self.value.as_str())
    }
}

pub fn matches_all(filters: &[Filter], record: &Record) -> bool {
    filters.iter().all(|filter| filter.matches(record))
}

pub fn apply(records: Vec<Record>, filters: &[Filter]) -> Vec<Record> {
    if filters.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| matches_all(filters, record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Filter, apply};
    use crate::core::grid::Record;

    fn records() -> Vec<Record> {
        vec![
            Record::from_iter([("column_1", "value A2"), ("column_two", "value B2")]),
            Record::from_iter([("column_1", "value A3"), ("column_two", "value B3")]),
            Record::from_iter([("column_1", "value A2"), ("column_two", "other")]),
        ]
    }

    #[test]
    fn single_filter_selects_matching_rows() {
        let out = apply(records(), &[Filter::new("column_1", "value A2")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("column_two"), Some("value B2"));
        assert_eq!(out[1].get("column_two"), Some("other"));
    }

    #[test]
    fn filters_are_anded() {
        let filters = [
            Filter::new("column_1", "value A2"),
            Filter::new("column_two", "value B2"),
        ];
        let out = apply(records(), &filters);
        assert_eq!(out, vec![records()[0].clone()]);
    }

    #[test]
    fn empty_filter_set_is_identity() {
        assert_eq!(apply(records(), &[]), records());
    }

    #[test]
    fn absent_key_matches_nothing() {
        assert!(apply(records(), &[Filter::new("missing", "")]).is_empty());
        assert!(apply(records(), &[Filter::new("missing", "value A2")]).is_empty());
    }

    #[test]
    fn comparison_is_exact() {
        assert!(apply(records(), &[Filter::new("column_1", "value a2")]).is_empty());
        assert!(apply(records(), &[Filter::new("column_1", "value A2 ")]).is_empty());
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let filters = [Filter::new("column_1", "value A2")];
        let once = apply(records(), &filters);
        let twice = apply(once.clone(), &filters);
        assert_eq!(once, twice);
    }

    #[test]
    fn filtered_to_empty_is_an_empty_list() {
        let out = apply(records(), &[Filter::new("column_1", "nope")]);
        assert_eq!(out, Vec::<Record>::new());
    }
}
