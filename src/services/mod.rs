pub mod database; // Relational database sources
pub mod dialect;
pub mod generator;
pub mod inference;
pub mod normalizer;
pub mod pipeline;
pub mod source; // File and API sources
pub mod transform;

pub use dialect::{dialect_for, SqlDialect, SUPPORTED_DIALECTS};
pub use pipeline::{run, RunOptions, RunSummary};
pub use source::RowSource;
pub use transform::{RuleTransform, Transform};
