// Type inference
//
// Classifies every column of a representative batch into one SemanticType.
// Runs once per conversion on the first batch; the result is frozen.

use crate::models::{Batch, ColumnDef, ColumnSchema, SemanticType, Value};

/// Whether a non-null value can be read as `semantic_type`.
///
/// Formatting uses the same rules, so a value that passed inference always renders.
pub fn conforms(value: &Value, semantic_type: SemanticType) -> bool {
    match semantic_type {
        SemanticType::Integer => value.as_integer().is_some(),
        SemanticType::Float => value.as_float().is_some(),
        SemanticType::Boolean => value.as_bool().is_some(),
        SemanticType::Date => value.as_date().is_some(),
        SemanticType::DateTime => value.as_datetime().is_some(),
        SemanticType::Text => true,
    }
}

/// Narrowest type satisfied by every non-null value; TEXT when there are none
pub fn infer_column<'a>(values: impl Iterator<Item = &'a Value> + Clone) -> SemanticType {
    let mut non_null = values.filter(|v| !v.is_null()).peekable();
    if non_null.peek().is_none() {
        return SemanticType::Text;
    }

    SemanticType::INFERENCE_ORDER
        .into_iter()
        .find(|t| non_null.clone().all(|v| conforms(v, *t)))
        .unwrap_or(SemanticType::Text)
}

/// Infer the schema of a batch, columns in batch order
pub fn infer_schema(batch: &Batch) -> ColumnSchema {
    let columns = batch
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| ColumnDef {
            name: name.clone(),
            semantic_type: infer_column(batch.column_values(idx)),
        })
        .collect();
    ColumnSchema::new(columns)
}
