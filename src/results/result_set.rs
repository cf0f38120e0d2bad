use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::row::{ResultRow, index_columns};
use crate::types::RowValues;

/// The outcome of one statement: the returned rows, or the affected-row count of a
/// statement that returns none.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<ResultRow>,
    /// Rows returned, or rows affected for statements without a result
    pub rows_affected: usize,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Result of a statement that produced no rows (INSERT/UPDATE/DDL without `RETURNING`).
    #[must_use]
    pub fn from_rows_affected(rows_affected: usize) -> ResultSet {
        ResultSet {
            rows_affected,
            ..ResultSet::default()
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(Arc::new(index_columns(&column_names)));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row to the result set. Rows added before column names are set are ignored.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let (Some(names), Some(index)) = (&self.column_names, &self.column_index) {
            self.results
                .push(ResultRow::with_index(names.clone(), index.clone(), row_values));
            self.rows_affected += 1;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// All rows as JSON objects, in result order.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.results.iter().map(ResultRow::to_json).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(Arc::new(vec!["foo".to_string(), "bar".to_string()]));
        rs.add_row_values(vec![RowValues::Text("oink".into()), RowValues::Int(100)]);
        rs.add_row_values(vec![RowValues::Text("snort".into()), RowValues::Int(-10)]);
        rs
    }

    #[test]
    fn rows_are_addressable_by_name_and_index() {
        let rs = sample();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows_affected, 2);
        assert_eq!(rs.results[0].get("bar"), Some(&RowValues::Int(100)));
        assert_eq!(rs.results[1].get_by_index(0).and_then(RowValues::as_text), Some("snort"));
        assert_eq!(rs.results[0].get("missing"), None);
    }

    #[test]
    fn converts_rows_to_json_objects() {
        let rs = sample();
        assert_eq!(
            rs.to_json(),
            serde_json::json!([{"foo": "oink", "bar": 100}, {"foo": "snort", "bar": -10}])
        );
    }

    #[test]
    fn rows_without_columns_are_dropped() {
        let mut rs = ResultSet::from_rows_affected(3);
        rs.add_row_values(vec![RowValues::Null]);
        assert!(rs.is_empty());
        assert_eq!(rs.rows_affected, 3);
    }
}
