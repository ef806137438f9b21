// Column name normalization
//
// Maps raw source field names onto canonical SQL-safe identifiers. Pure and
// deterministic so every batch of a run normalizes to the same names.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::models::Batch;

/// Normalize one raw name. `position` is the 1-based column position, used
/// when nothing usable is left of the raw name.
pub fn normalize(raw: &str, position: usize) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        format!("col_{}", position)
    } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("col_{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Normalize a full column list. Names that collide after normalization get a
/// `_2`, `_3`, ... suffix in column order.
pub fn normalize_columns(raw: &[String]) -> Vec<String> {
    ColumnNamer::default().name_columns(raw)
}

/// Names the columns of every batch in a run.
///
/// A raw name keeps the identifier it was given the first time it was seen,
/// whatever its position in later batches, so collision suffixes cannot move
/// between columns. A repeated raw name within one batch is told apart by its
/// occurrence count.
#[derive(Debug, Default)]
pub struct ColumnNamer {
    assigned: HashMap<(String, usize), String>,
}

impl ColumnNamer {
    pub fn name_columns(&mut self, raw: &[String]) -> Vec<String> {
        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        let keys: Vec<(String, usize)> = raw
            .iter()
            .map(|name| {
                let n = occurrences.entry(name.as_str()).or_insert(0);
                *n += 1;
                (name.clone(), *n)
            })
            .collect();

        let mut names: Vec<Option<String>> = keys.iter().map(|key| self.assigned.get(key).cloned()).collect();
        let mut claimed: HashSet<String> = names.iter().flatten().cloned().collect();

        for (idx, key) in keys.into_iter().enumerate() {
            if names[idx].is_some() {
                continue;
            }
            let base = normalize(&key.0, idx + 1);
            let mut candidate = base.clone();
            let mut suffix = 2;
            while claimed.contains(&candidate) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            if candidate != base {
                tracing::warn!(
                    "Column '{}' normalizes to '{}' which is already taken, using '{}'",
                    key.0,
                    base,
                    candidate
                );
            }
            claimed.insert(candidate.clone());
            self.assigned.insert(key, candidate.clone());
            names[idx] = Some(candidate);
        }

        names.into_iter().flatten().collect()
    }

    /// Rename a batch's columns to their normalized form
    pub fn rename(&mut self, batch: Batch) -> Result<Batch> {
        let names = self.name_columns(batch.columns());
        batch.with_columns(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("Customer Name", 1), "customer_name");
        assert_eq!(normalize("  Order-ID  ", 1), "order_id");
        assert_eq!(normalize("price ($)", 1), "price");
        assert_eq!(normalize("already_fine", 1), "already_fine");
    }

    #[test]
    fn test_normalize_leading_digit_and_empty() {
        assert_eq!(normalize("2024 total", 3), "col_2024_total");
        assert_eq!(normalize("", 1), "col_1");
        assert_eq!(normalize("???", 4), "col_4");
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = "Mixed CASE / name";
        assert_eq!(normalize(raw, 1), normalize(raw, 1));
    }

    #[test]
    fn test_collisions_get_suffixes() {
        let raw = vec![
            "Name".to_string(),
            "name ".to_string(),
            "NAME!".to_string(),
            "".to_string(),
            "col_5".to_string(),
        ];
        assert_eq!(
            normalize_columns(&raw),
            vec!["name", "name_2", "name_3", "col_4", "col_5"]
        );
    }

    #[test]
    fn test_names_follow_raw_columns_across_batches() {
        let mut namer = ColumnNamer::default();
        let first = vec!["Name".to_string(), "name ".to_string()];
        let reordered = vec!["name ".to_string(), "Name".to_string()];
        assert_eq!(namer.name_columns(&first), vec!["name", "name_2"]);
        assert_eq!(namer.name_columns(&reordered), vec!["name_2", "name"]);

        // a new spelling takes a free name, never one in use by this batch
        let extra = vec!["Name".to_string(), "name ".to_string(), "NAME".to_string()];
        assert_eq!(namer.name_columns(&extra), vec!["name", "name_2", "name_3"]);
        assert_eq!(namer.name_columns(&["NAME".to_string()]), vec!["name_3"]);
    }

    #[test]
    fn test_new_spelling_lines_up_with_absent_column() {
        let mut namer = ColumnNamer::default();
        assert_eq!(namer.name_columns(&["a".to_string(), "b".to_string()]), vec!["a", "b"]);
        assert_eq!(namer.name_columns(&["B".to_string(), "a".to_string()]), vec!["b", "a"]);
    }

    #[test]
    fn test_repeated_raw_names_stay_apart() {
        let mut namer = ColumnNamer::default();
        let raw = vec!["x".to_string(), "x".to_string()];
        assert_eq!(namer.name_columns(&raw), vec!["x", "x_2"]);
        assert_eq!(namer.name_columns(&raw), vec!["x", "x_2"]);
    }

    #[test]
    fn test_rename_keeps_values() {
        let batch = Batch::try_new(
            vec!["First Name".to_string()],
            vec![vec![Value::from("Ada")]],
        )
        .unwrap();
        let batch = ColumnNamer::default().rename(batch).unwrap();
        assert_eq!(batch.columns(), &["first_name".to_string()]);
        assert_eq!(batch.rows()[0][0], Value::from("Ada"));
    }
}
