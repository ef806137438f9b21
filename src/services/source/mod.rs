// Row source adapters for files and HTTP APIs.
// Database sources live in services::database.
pub mod adapter;
pub mod api;
pub mod delimited;
pub mod document;
pub mod selector;
pub mod spreadsheet;

pub use adapter::RowSource;
pub use api::{ApiRequest, ApiSource, HttpMethod};
pub use delimited::DelimitedSource;
pub use document::DocumentSource;
pub use selector::Selector;
pub use spreadsheet::SpreadsheetSource;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{ConvertError, Result};
use crate::models::{Batch, Value};

/// File formats a file source can be opened as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Auto,
    Csv,
    Excel,
    Json,
    JsonLines,
}

impl FileFormat {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(FileFormat::Auto),
            "csv" | "tsv" => Ok(FileFormat::Csv),
            "excel" | "xlsx" | "xls" => Ok(FileFormat::Excel),
            "json" => Ok(FileFormat::Json),
            "jsonl" | "ndjson" => Ok(FileFormat::JsonLines),
            "xml" | "html" => Err(ConvertError::FormatUnsupported(format!(
                "{} documents cannot be read by this tool",
                s
            ))),
            _ => Err(ConvertError::FormatUnsupported(format!(
                "unknown format '{}' (expected auto, csv, excel, json or jsonl)",
                s
            ))),
        }
    }

    /// Detect the format from the file extension, looking through a `.gz` suffix
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = data_extension(path);
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(FileFormat::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(FileFormat::Excel),
            "json" => Ok(FileFormat::Json),
            "jsonl" | "ndjson" => Ok(FileFormat::JsonLines),
            "xml" | "html" => Err(ConvertError::FormatUnsupported(format!(
                ".{} documents cannot be read by this tool",
                ext
            ))),
            "" => Err(ConvertError::FormatUnsupported(format!(
                "cannot detect the format of '{}' without an extension; use --format",
                path.display()
            ))),
            other => Err(ConvertError::FormatUnsupported(format!(".{}", other))),
        }
    }
}

pub(crate) fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Lowercased extension of the data inside the file (`a.csv.gz` -> `csv`)
pub(crate) fn data_extension(path: &Path) -> String {
    let inner = if is_gzipped(path) {
        path.file_stem().map(Path::new)
    } else {
        Some(path)
    };
    inner
        .and_then(|p| p.extension())
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Open a file for reading, transparently decompressing `.gz`
pub(crate) fn open_reader(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file = File::open(path).map_err(|e| {
        ConvertError::SourceRead(format!("cannot open '{}': {}", path.display(), e))
    })?;
    if is_gzipped(path) {
        Ok(Box::new(flate2::read::GzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(file))
    }
}

/// Open a file source of the given format
pub fn open_file_source(path: &Path, format: FileFormat, chunk_size: usize) -> Result<Box<dyn RowSource>> {
    let format = match format {
        FileFormat::Auto => FileFormat::detect(path)?,
        other => other,
    };
    tracing::info!("Opening {} as {:?}", path.display(), format);

    match format {
        FileFormat::Csv => Ok(Box::new(DelimitedSource::open(path, chunk_size)?)),
        FileFormat::Excel => Ok(Box::new(SpreadsheetSource::open(path)?)),
        FileFormat::Json => Ok(Box::new(DocumentSource::open(path, chunk_size)?)),
        FileFormat::JsonLines => Ok(Box::new(DocumentSource::open_lines(path, chunk_size)?)),
        FileFormat::Auto => Err(ConvertError::FormatUnsupported(format!(
            "cannot detect the format of '{}'",
            path.display()
        ))),
    }
}

/// One keyed record per JSON node: objects become rows, anything else a `value` row
pub(crate) fn record_from_json(node: serde_json::Value) -> Vec<(String, Value)> {
    match node {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, Value::from_json(v)))
            .collect(),
        other => vec![("value".to_string(), Value::from_json(other))],
    }
}

pub(crate) fn batch_from_json(nodes: Vec<serde_json::Value>) -> Batch {
    Batch::from_records(nodes.into_iter().map(record_from_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(FileFormat::detect(Path::new("a.csv")).unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::detect(Path::new("a.CSV.gz")).unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::detect(Path::new("book.xlsx")).unwrap(), FileFormat::Excel);
        assert_eq!(FileFormat::detect(Path::new("d.json")).unwrap(), FileFormat::Json);
        assert_eq!(FileFormat::detect(Path::new("d.ndjson")).unwrap(), FileFormat::JsonLines);
    }

    #[test]
    fn test_detect_unsupported() {
        for name in ["a.xml", "a.parquet", "noext"] {
            let err = FileFormat::detect(Path::new(name)).unwrap_err();
            assert!(matches!(err, ConvertError::FormatUnsupported(_)), "{}", name);
        }
    }

    #[test]
    fn test_forced_format_names() {
        assert_eq!(FileFormat::from_str("EXCEL").unwrap(), FileFormat::Excel);
        assert!(FileFormat::from_str("xml").is_err());
    }

    #[test]
    fn test_batch_from_json_wraps_scalars() {
        let batch = batch_from_json(vec![json!({"a": 1}), json!(5)]);
        assert_eq!(batch.columns(), &["a".to_string(), "value".to_string()]);
        assert_eq!(batch.rows()[1], vec![Value::Null, Value::Int(5)]);
    }

    #[test]
    fn test_open_file_source_rejects_unknown() {
        let err = open_file_source(Path::new("data.bin"), FileFormat::Auto, 10).err().unwrap();
        assert!(matches!(err, ConvertError::FormatUnsupported(_)));
    }
}
