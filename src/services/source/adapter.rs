// Row source abstraction shared by file, database and API origins
use crate::error::Result;
use crate::models::Batch;

/// Row source trait - pull-based, ordered batches with uniform column names
///
/// A source never holds more than one outstanding batch; the caller finishes
/// with a batch before asking for the next one.
#[async_trait::async_trait]
pub trait RowSource: Send {
    /// Human-readable origin for logs and error messages
    fn describe(&self) -> String;

    /// Whether the source reads incrementally. Non-streaming sources deliver
    /// their whole dataset as one batch.
    fn supports_streaming(&self) -> bool;

    /// Next batch in read order, `None` once the source is exhausted
    async fn next_batch(&mut self) -> Result<Option<Batch>>;

    /// Release connections and file handles. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}
