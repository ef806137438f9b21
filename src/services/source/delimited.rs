// Delimited text source (CSV/TSV, optionally gzip-compressed)
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};

use super::adapter::RowSource;
use super::{data_extension, open_reader};
use crate::error::Result;
use crate::models::{Batch, Value};

/// Streams a delimited file `chunk_size` rows at a time.
///
/// The first record is the header. Empty cells are read as NULL; every other
/// cell is raw text and typed later by inference.
pub struct DelimitedSource {
    name: String,
    reader: Option<csv::Reader<Box<dyn Read + Send>>>,
    columns: Vec<String>,
    chunk_size: usize,
    record: StringRecord,
    emitted: bool,
}

impl DelimitedSource {
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let delimiter = if data_extension(path) == "tsv" { b'\t' } else { b',' };
        Self::from_reader(path.to_path_buf(), open_reader(path)?, delimiter, chunk_size)
    }

    pub fn from_reader(
        path: PathBuf,
        input: Box<dyn Read + Send>,
        delimiter: u8,
        chunk_size: usize,
    ) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(input);
        let columns = reader.headers()?.iter().map(String::from).collect();

        Ok(Self {
            name: path.display().to_string(),
            reader: Some(reader),
            columns,
            chunk_size: chunk_size.max(1),
            record: StringRecord::new(),
            emitted: false,
        })
    }
}

fn cell_value(field: &str) -> Value {
    if field.is_empty() {
        Value::Null
    } else {
        Value::Text(field.to_string())
    }
}

#[async_trait::async_trait]
impl RowSource for DelimitedSource {
    fn describe(&self) -> String {
        format!("delimited file '{}'", self.name)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut rows = Vec::with_capacity(self.chunk_size);
        while rows.len() < self.chunk_size {
            if !reader.read_record(&mut self.record)? {
                break;
            }
            rows.push(self.record.iter().map(cell_value).collect());
        }

        if rows.is_empty() {
            self.reader = None;
            // A header-only file still yields its column list once
            if !self.emitted && !self.columns.is_empty() {
                self.emitted = true;
                return Ok(Some(Batch::empty(self.columns.clone())));
            }
            return Ok(None);
        }

        self.emitted = true;
        tracing::debug!("Read {} rows from {}", rows.len(), self.name);
        Batch::try_new(self.columns.clone(), rows).map(Some)
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}
