// Per-batch value transformations
//
// Applied after normalization and schema fixing, before SQL generation.
// A transform may change values but never the column list.

use serde::Deserialize;
use std::path::Path;

use crate::error::{ConvertError, Result};
use crate::models::{Batch, Value};

/// A value-level rewrite applied to every batch of a run
pub trait Transform: Send + Sync {
    fn apply(&self, batch: Batch) -> Result<Batch>;
}

/// One declarative rule from a transform file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    Uppercase { column: String },
    Lowercase { column: String },
    Trim { column: String },
    Replace { column: String, from: String, to: String },
    FillNull { column: String, value: serde_json::Value },
    Round { column: String, digits: u32 },
}

impl Rule {
    fn column(&self) -> &str {
        match self {
            Rule::Uppercase { column }
            | Rule::Lowercase { column }
            | Rule::Trim { column }
            | Rule::Replace { column, .. }
            | Rule::FillNull { column, .. }
            | Rule::Round { column, .. } => column,
        }
    }

    fn apply_value(&self, value: Value) -> Value {
        match (self, value) {
            (Rule::Uppercase { .. }, Value::Text(s)) => Value::Text(s.to_uppercase()),
            (Rule::Lowercase { .. }, Value::Text(s)) => Value::Text(s.to_lowercase()),
            (Rule::Trim { .. }, Value::Text(s)) => Value::Text(s.trim().to_string()),
            (Rule::Replace { from, to, .. }, Value::Text(s)) => Value::Text(s.replace(from.as_str(), to)),
            (Rule::FillNull { value, .. }, Value::Null) => Value::from_json(value.clone()),
            (Rule::Round { digits, .. }, Value::Float(f)) => Value::Float(round_to(f, *digits)),
            (Rule::Round { digits, .. }, text @ Value::Text(_)) => match text.as_float() {
                Some(f) => Value::Float(round_to(f, *digits)),
                None => text,
            },
            (_, other) => other,
        }
    }
}

fn round_to(f: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (f * factor).round() / factor
}

#[derive(Debug, Deserialize)]
struct TransformFile {
    transformations: Vec<Rule>,
}

/// Rule list loaded from a JSON transform file
#[derive(Debug, Clone, Default)]
pub struct RuleTransform {
    rules: Vec<Rule>,
}

impl RuleTransform {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: TransformFile = serde_json::from_str(json)
            .map_err(|e| ConvertError::Validation(format!("invalid transform config: {}", e)))?;
        Ok(Self::new(file.transformations))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Validation(format!(
                "cannot read transform config '{}': {}",
                path.display(),
                e
            ))
        })?;
        let transform = Self::from_json_str(&json)?;
        tracing::info!(
            "Loaded {} transformation rules from '{}'",
            transform.rules.len(),
            path.display()
        );
        Ok(transform)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Transform for RuleTransform {
    fn apply(&self, batch: Batch) -> Result<Batch> {
        let mut targets = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let idx = batch.column_index(rule.column()).ok_or_else(|| {
                ConvertError::Transform(format!(
                    "rule targets unknown column '{}' (available: {})",
                    rule.column(),
                    batch.columns().join(", ")
                ))
            })?;
            targets.push((idx, rule));
        }

        let (columns, rows) = batch.into_parts();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                for (idx, rule) in &targets {
                    let value = std::mem::replace(&mut row[*idx], Value::Null);
                    row[*idx] = rule.apply_value(value);
                }
                row
            })
            .collect();

        Batch::try_new(columns, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn batch() -> Batch {
        Batch::try_new(
            vec!["name".to_string(), "price".to_string(), "city".to_string()],
            vec![
                vec![Value::from("  ada "), Value::Float(1.2345), Value::Null],
                vec![Value::from("bob"), Value::from("2.5"), Value::from("Paris")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_rules() {
        let t = RuleTransform::from_json_str(
            r#"{"transformations": [
                {"type": "trim", "column": "name"},
                {"type": "replace", "column": "city", "from": "Paris", "to": "PAR"},
                {"type": "fill_null", "column": "city", "value": "unknown"},
                {"type": "round", "column": "price", "digits": 2}
            ]}"#,
        )
        .unwrap();
        assert_eq!(t.rules().len(), 4);
        assert_eq!(t.rules()[0], Rule::Trim { column: "name".to_string() });
    }

    #[test]
    fn test_apply_rules_in_order() {
        let t = RuleTransform::new(vec![
            Rule::Trim { column: "name".to_string() },
            Rule::Uppercase { column: "name".to_string() },
            Rule::Round { column: "price".to_string(), digits: 2 },
            Rule::FillNull { column: "city".to_string(), value: serde_json::json!("unknown") },
        ]);
        let out = t.apply(batch()).unwrap();
        assert_eq!(out.columns(), batch().columns());
        assert_eq!(out.rows()[0], vec![Value::from("ADA"), Value::Float(1.23), Value::from("unknown")]);
        assert_eq!(out.rows()[1], vec![Value::from("BOB"), Value::Float(2.5), Value::from("Paris")]);
    }

    #[test]
    fn test_unknown_column_is_transform_error() {
        let t = RuleTransform::new(vec![Rule::Lowercase { column: "nope".to_string() }]);
        let err = t.apply(batch()).unwrap_err();
        assert!(matches!(err, ConvertError::Transform(_)));
    }

    #[test]
    fn test_invalid_config_is_validation_error() {
        let err = RuleTransform::from_json_str(r#"{"transformations": [{"type": "explode"}]}"#).unwrap_err();
        assert!(matches!(err, ConvertError::Validation(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"transformations": [{{"type": "lowercase", "column": "name"}}]}}"#).unwrap();
        let t = RuleTransform::from_file(file.path()).unwrap();
        assert_eq!(t.rules().len(), 1);
    }
}
