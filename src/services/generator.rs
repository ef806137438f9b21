// Batch SQL generation
//
// Turns one typed batch into INSERT statements, `batch_size` rows per statement.

use crate::error::{ConvertError, Result};
use crate::models::{Batch, ColumnSchema, SqlStatement};
use crate::services::dialect::SqlDialect;

/// Rows per INSERT; zero and negative sizes mean one row per statement
pub fn effective_batch_size(batch_size: i64) -> usize {
    if batch_size <= 0 {
        1
    } else {
        batch_size as usize
    }
}

/// Generate the INSERT statements for one batch.
///
/// The batch must already be in schema column order. Every row lands in
/// exactly one statement; the last group may be shorter than `batch_size`.
/// Dialects with a per-INSERT row limit get smaller groups.
pub fn generate(
    batch: &Batch,
    table: &str,
    schema: &ColumnSchema,
    dialect: &dyn SqlDialect,
    batch_size: i64,
) -> Result<Vec<SqlStatement>> {
    let expected = schema.column_names();
    if batch.columns() != expected.as_slice() {
        return Err(ConvertError::Generation(format!(
            "batch columns [{}] do not match schema columns [{}]",
            batch.columns().join(", "),
            expected.join(", ")
        )));
    }

    let requested = effective_batch_size(batch_size);
    let size = match dialect.max_rows_per_insert() {
        Some(max) => requested.min(max),
        None => requested,
    };
    batch
        .rows()
        .chunks(size)
        .enumerate()
        .map(|(group, rows)| {
            dialect.insert_statement(table, schema, rows).map_err(|e| match e {
                ConvertError::Generation(msg) => {
                    let start = group * size + 1;
                    ConvertError::Generation(format!(
                        "{} (rows {}-{} of batch)",
                        msg,
                        start,
                        start + rows.len() - 1
                    ))
                }
                other => other,
            })
        })
        .collect()
}
