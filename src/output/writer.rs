// Statement sinks
//
// Statements are written as they are produced, each followed by `;\n`.

use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{ConvertError, Result};
use crate::models::SqlStatement;

const TERMINATOR: &[u8] = b";\n";

/// Destination for generated statements
pub trait StatementSink: Send {
    fn write_statement(&mut self, statement: &SqlStatement) -> Result<()>;

    /// Flush and release the destination. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

enum Target {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Stdout(BufWriter<Stdout>),
}

impl Target {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Target::Plain(w) => w,
            Target::Gzip(w) => w,
            Target::Stdout(w) => w,
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            Target::Plain(mut w) => {
                w.flush()?;
                w.into_inner().map_err(|e| e.into_error())?.sync_all()
            }
            Target::Gzip(w) => w.finish()?.flush(),
            Target::Stdout(mut w) => w.flush(),
        }
    }
}

/// Writes statements to a file (gzip when the name ends in `.gz`) or to
/// stdout when the destination is `-`
pub struct StreamingWriter {
    target: Option<Target>,
    destination: String,
    written: usize,
}

impl StreamingWriter {
    pub fn create(destination: &str) -> Result<Self> {
        let target = if destination == "-" {
            Target::Stdout(BufWriter::new(io::stdout()))
        } else {
            let path = Path::new(destination);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConvertError::SinkWrite(format!("cannot create directory '{}': {}", parent.display(), e))
                })?;
            }
            let file = File::create(path).map_err(|e| {
                ConvertError::SinkWrite(format!("cannot create '{}': {}", destination, e))
            })?;
            let file = BufWriter::new(file);
            if path.extension().map(|e| e.eq_ignore_ascii_case("gz")).unwrap_or(false) {
                Target::Gzip(GzEncoder::new(file, Compression::default()))
            } else {
                Target::Plain(file)
            }
        };

        tracing::info!("Writing SQL to {}", if destination == "-" { "stdout" } else { destination });
        Ok(Self {
            target: Some(target),
            destination: destination.to_string(),
            written: 0,
        })
    }

    pub fn statements_written(&self) -> usize {
        self.written
    }

    fn write_error(&self, e: io::Error) -> ConvertError {
        ConvertError::SinkWrite(format!("cannot write to '{}': {}", self.destination, e))
    }
}

impl StatementSink for StreamingWriter {
    fn write_statement(&mut self, statement: &SqlStatement) -> Result<()> {
        let Some(target) = self.target.as_mut() else {
            return Err(ConvertError::SinkWrite(format!("'{}' is already closed", self.destination)));
        };
        let result = target
            .writer()
            .write_all(statement.as_str().as_bytes())
            .and_then(|_| target.writer().write_all(TERMINATOR));
        result.map_err(|e| self.write_error(e))?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.target.take() {
            Some(target) => {
                target.finish().map_err(|e| self.write_error(e))?;
                tracing::debug!("Closed {} after {} statements", self.destination, self.written);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for StreamingWriter {
    fn drop(&mut self) {
        if self.target.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!("{}", e);
            }
        }
    }
}

/// Keeps statements in memory; used for embedding and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    statements: Vec<SqlStatement>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[SqlStatement] {
        &self.statements
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Statements as they would appear in an output file
    pub fn render(&self) -> String {
        self.statements
            .iter()
            .map(|s| format!("{};\n", s))
            .collect()
    }
}

impl StatementSink for MemorySink {
    fn write_statement(&mut self, statement: &SqlStatement) -> Result<()> {
        if self.closed {
            return Err(ConvertError::SinkWrite("memory sink is already closed".to_string()));
        }
        self.statements.push(statement.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
