pub mod writer;

pub use writer::{MemorySink, StatementSink, StreamingWriter};
