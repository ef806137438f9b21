// Streaming conversion run
//
// One sequential pull loop: read a batch, type it against the schema fixed
// from the first batch, generate its statements and hand them to the sink
// before asking the source for the next batch.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{ConvertError, Result};
use crate::models::{Batch, ColumnSchema};
use crate::output::StatementSink;
use crate::services::dialect::{dialect_for, SqlDialect};
use crate::services::generator::generate;
use crate::services::inference::infer_schema;
use crate::services::normalizer::ColumnNamer;
use crate::services::source::RowSource;
use crate::services::transform::Transform;

/// Per-run settings
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub table: String,
    pub dialect: String,
    pub create_table: bool,
    /// Rows per INSERT; values below 1 mean one row per statement
    pub batch_size: i64,
    /// Fail instead of degrading when the source cannot stream
    pub strict_streaming: bool,
}

impl RunOptions {
    pub fn new(table: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            dialect: dialect.into(),
            create_table: false,
            batch_size: 1,
            strict_streaming: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub rows_processed: usize,
    pub statements_emitted: usize,
    pub batches: usize,
    pub schema: ColumnSchema,
}

enum RunState {
    Start,
    SchemaPending(Batch),
    SchemaFixed {
        schema: ColumnSchema,
        first: Option<Batch>,
    },
    Done(Option<ColumnSchema>),
}

struct Run<'a> {
    options: &'a RunOptions,
    dialect: Arc<dyn SqlDialect>,
    transform: Option<&'a dyn Transform>,
    namer: ColumnNamer,
    dropped_columns: HashSet<String>,
    rows: usize,
    statements: usize,
    batches: usize,
}

impl Run<'_> {
    fn emit(&mut self, sink: &mut dyn StatementSink, batch: Batch, schema: &ColumnSchema) -> Result<()> {
        let batch = match self.transform {
            Some(transform) => {
                let columns = batch.columns().to_vec();
                let out = transform.apply(batch)?;
                if out.columns() != columns.as_slice() {
                    return Err(ConvertError::Transform(format!(
                        "transform changed the columns from [{}] to [{}]",
                        columns.join(", "),
                        out.columns().join(", ")
                    )));
                }
                out
            }
            None => batch,
        };

        let statements = generate(
            &batch,
            &self.options.table,
            schema,
            self.dialect.as_ref(),
            self.options.batch_size,
        )?;
        for statement in &statements {
            sink.write_statement(statement)?;
        }

        self.batches += 1;
        self.rows += batch.len();
        self.statements += statements.len();
        tracing::debug!(
            "Batch {}: {} rows, {} statements",
            self.batches,
            batch.len(),
            statements.len()
        );
        Ok(())
    }

    /// Align a later batch with the fixed schema
    fn conform(&mut self, batch: Batch, schema: &ColumnSchema) -> Batch {
        let (batch, dropped) = batch.project(&schema.column_names());
        for column in dropped {
            if self.dropped_columns.insert(column.clone()) {
                tracing::warn!(
                    "Column '{}' is not part of the inferred schema; its values are dropped",
                    column
                );
            }
        }
        batch
    }

    async fn drive(&mut self, source: &mut dyn RowSource, sink: &mut dyn StatementSink) -> Result<RunSummary> {
        if !source.supports_streaming() {
            if self.options.strict_streaming {
                return Err(ConvertError::FormatUnsupported(format!(
                    "{} cannot be read incrementally",
                    source.describe()
                )));
            }
            tracing::warn!(
                "{} cannot be read incrementally; loading it as a single batch",
                source.describe()
            );
        }

        let mut state = RunState::Start;
        let schema = loop {
            state = match state {
                RunState::Start => match source.next_batch().await? {
                    Some(batch) => RunState::SchemaPending(self.namer.rename(batch)?),
                    None => RunState::Done(None),
                },
                RunState::SchemaPending(batch) if batch.columns().is_empty() => RunState::Done(None),
                RunState::SchemaPending(batch) => {
                    let schema = infer_schema(&batch);
                    tracing::info!("Inferred schema {}", schema);
                    if self.options.create_table {
                        let create = self.dialect.create_table_statement(&self.options.table, &schema);
                        sink.write_statement(&create)?;
                        self.statements += 1;
                    }
                    RunState::SchemaFixed {
                        schema,
                        first: Some(batch),
                    }
                }
                RunState::SchemaFixed { schema, first } => {
                    let batch = match first {
                        Some(batch) => Some(batch),
                        None => match source.next_batch().await? {
                            Some(batch) => {
                                let batch = self.namer.rename(batch)?;
                                Some(self.conform(batch, &schema))
                            }
                            None => None,
                        },
                    };
                    match batch {
                        Some(batch) => {
                            self.emit(sink, batch, &schema)?;
                            RunState::SchemaFixed { schema, first: None }
                        }
                        None => RunState::Done(Some(schema)),
                    }
                }
                RunState::Done(schema) => break schema,
            };
        };

        let schema = match schema {
            Some(schema) => schema,
            None if self.options.create_table => {
                return Err(ConvertError::SchemaInference(format!(
                    "{} produced no columns to declare",
                    source.describe()
                )))
            }
            None => {
                tracing::warn!("{} produced no data", source.describe());
                ColumnSchema::new(Vec::new())
            }
        };

        Ok(RunSummary {
            rows_processed: self.rows,
            statements_emitted: self.statements,
            batches: self.batches,
            schema,
        })
    }
}

/// Convert everything `source` yields into statements written to `sink`.
///
/// The source and the sink are closed before this returns, on success and on
/// every failure path.
pub async fn run(
    source: &mut dyn RowSource,
    transform: Option<&dyn Transform>,
    sink: &mut dyn StatementSink,
    options: &RunOptions,
) -> Result<RunSummary> {
    let result = match dialect_for(&options.dialect) {
        Ok(dialect) => {
            let mut run = Run {
                options,
                dialect,
                transform,
                namer: ColumnNamer::default(),
                dropped_columns: HashSet::new(),
                rows: 0,
                statements: 0,
                batches: 0,
            };
            run.drive(source, sink).await
        }
        Err(e) => Err(e),
    };

    let source_closed = source.close().await;
    let sink_closed = sink.close();

    match result {
        Ok(summary) => {
            source_closed?;
            sink_closed?;
            tracing::info!(
                "Processed {} rows in {} batches into {} SQL statements",
                summary.rows_processed,
                summary.batches,
                summary.statements_emitted
            );
            Ok(summary)
        }
        Err(e) => {
            for closed in [source_closed, sink_closed] {
                if let Err(close_err) = closed {
                    tracing::warn!("Cleanup after failed run: {}", close_err);
                }
            }
            Err(e)
        }
    }
}
