use std::collections::HashSet;

use crate::rows::Record;

#[must_use]
pub fn infer_columns(rows: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for row in rows {
        for key in row.keys() {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }
    }

    columns
}

#[must_use]
pub fn resolve_columns(rows: &[Record], declared: &[String]) -> Vec<String> {
    if rows.is_empty() {
        return declared.to_vec();
    }
    infer_columns(rows)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{infer_columns, resolve_columns};
    use crate::rows::Record;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().expect("test record must be an object")
    }

    #[test]
    fn keeps_first_seen_order_across_rows() {
        let rows = vec![
            record(json!({"b": 1, "a": 2})),
            record(json!({"a": 3, "c": 4})),
        ];

        assert_eq!(infer_columns(&rows), vec!["b", "a", "c"]);
    }

    #[test]
    fn does_not_sort_or_deduplicate_beyond_first_occurrence() {
        let rows = vec![
            record(json!({"zeta": 1})),
            record(json!({"alpha": 1, "zeta": 2})),
            record(json!({"mid": null, "alpha": 3})),
        ];

        assert_eq!(infer_columns(&rows), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn empty_page_falls_back_to_declared_columns() {
        let declared = vec!["id".to_string(), "name".to_string()];
        assert_eq!(resolve_columns(&[], &declared), declared);

        let rows = vec![record(json!({"other": 1}))];
        assert_eq!(resolve_columns(&rows, &declared), vec!["other"]);
    }
}
