// Spreadsheet source (xlsx/xls/ods) backed by calamine
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveTime;

use super::adapter::RowSource;
use crate::error::{ConvertError, Result};
use crate::models::{Batch, Value};

/// Reads the first worksheet in one go; the workbook format has no
/// incremental reader, so this source never streams.
pub struct SpreadsheetSource {
    path: PathBuf,
    batch: Option<Batch>,
}

impl SpreadsheetSource {
    pub fn open(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook.worksheet_range_at(0).ok_or_else(|| {
            ConvertError::SourceRead(format!("workbook '{}' has no worksheets", path.display()))
        })??;

        let mut rows = range.rows();
        let columns: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(header_text).collect(),
            None => Vec::new(),
        };
        let data = rows
            .map(|row| row.iter().map(cell_value).collect())
            .collect::<Vec<_>>();

        tracing::info!(
            "Loaded {} rows x {} columns from {}",
            data.len(),
            columns.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            batch: Some(Batch::try_new(columns, data)?),
        })
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

// Integral floats are how xlsx stores whole numbers
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT => Value::Int(*f as i64),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) if s.is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) if ts.time() == NaiveTime::MIN => Value::Date(ts.date()),
            Some(ts) => Value::DateTime(ts),
            None => Value::Null,
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

#[async_trait::async_trait]
impl RowSource for SpreadsheetSource {
    fn describe(&self) -> String {
        format!("spreadsheet '{}'", self.path.display())
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        Ok(self.batch.take())
    }

    async fn close(&mut self) -> Result<()> {
        self.batch = None;
        Ok(())
    }
}
