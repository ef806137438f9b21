use std::collections::HashMap;

use crate::error::{ConvertError, Result};
use crate::models::Value;

/// One row of cell values, positionally aligned with its batch's column list
pub type Row = Vec<Value>;

/// A bounded slice of a dataset: ordered column names shared by every row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Batch {
    /// Create a batch, checking that every row has one value per column
    pub fn try_new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(ConvertError::SourceRead(format!(
                "row {} has {} values but the batch has {} columns",
                idx + 1,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a batch from keyed records. Columns follow first appearance across
    /// the records; a key missing from a record reads as NULL.
    pub fn from_records(records: Vec<Vec<(String, Value)>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in &records {
            for (key, _) in record {
                if !index.contains_key(key) {
                    index.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|record| {
                let mut row = vec![Value::Null; columns.len()];
                for (key, value) in record {
                    row[index[&key]] = value;
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + Clone {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Replace the column names, keeping values in place
    pub fn with_columns(self, columns: Vec<String>) -> Result<Self> {
        if columns.len() != self.columns.len() {
            return Err(ConvertError::Validation(format!(
                "cannot rename {} columns to {} names",
                self.columns.len(),
                columns.len()
            )));
        }
        Ok(Self {
            columns,
            rows: self.rows,
        })
    }

    /// Reorder the batch onto `target` column order.
    ///
    /// Target columns missing from this batch are filled with NULL. Returns the
    /// projected batch and the names of the columns that had no place in `target`.
    pub fn project(self, target: &[String]) -> (Self, Vec<String>) {
        if self.columns.as_slice() == target {
            return (self, Vec::new());
        }

        let mapping: Vec<Option<usize>> = target
            .iter()
            .map(|name| self.column_index(name))
            .collect();
        let dropped: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !target.contains(c))
            .cloned()
            .collect();

        let rows = self
            .rows
            .into_iter()
            .map(|mut row| {
                mapping
                    .iter()
                    .map(|src| match src {
                        Some(i) => std::mem::replace(&mut row[*i], Value::Null),
                        None => Value::Null,
                    })
                    .collect()
            })
            .collect();

        (
            Self {
                columns: target.to_vec(),
                rows,
            },
            dropped,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_try_new_rejects_ragged_rows() {
        let err = Batch::try_new(cols(&["a", "b"]), vec![vec![Value::Int(1)]]).unwrap_err();
        assert!(matches!(err, ConvertError::SourceRead(_)));
    }

    #[test]
    fn test_from_records_unions_keys_in_first_seen_order() {
        let batch = Batch::from_records(vec![
            vec![("id".to_string(), Value::Int(1)), ("name".to_string(), "A".into())],
            vec![("name".to_string(), "B".into()), ("extra".to_string(), Value::Bool(true))],
        ]);
        assert_eq!(batch.columns(), &cols(&["id", "name", "extra"])[..]);
        assert_eq!(batch.rows()[0], vec![Value::Int(1), "A".into(), Value::Null]);
        assert_eq!(batch.rows()[1], vec![Value::Null, "B".into(), Value::Bool(true)]);
    }

    #[test]
    fn test_project_reorders_fills_and_reports_dropped() {
        let batch = Batch::try_new(
            cols(&["name", "junk", "id"]),
            vec![vec!["A".into(), Value::Int(9), Value::Int(1)]],
        )
        .unwrap();

        let (projected, dropped) = batch.project(&cols(&["id", "name", "age"]));
        assert_eq!(projected.columns(), &cols(&["id", "name", "age"])[..]);
        assert_eq!(projected.rows()[0], vec![Value::Int(1), "A".into(), Value::Null]);
        assert_eq!(dropped, cols(&["junk"]));
    }

    #[test]
    fn test_project_same_order_is_identity() {
        let batch = Batch::try_new(cols(&["a"]), vec![vec![Value::Int(1)]]).unwrap();
        let (projected, dropped) = batch.clone().project(&cols(&["a"]));
        assert_eq!(projected, batch);
        assert!(dropped.is_empty());
    }
}
