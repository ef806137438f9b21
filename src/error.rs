use thiserror::Error;

/// Conversion error kinds. Every failure in a run surfaces as one of these.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Unsupported format: {0}")]
    FormatUnsupported(String),

    #[error("Source read error: {0}")]
    SourceRead(String),

    #[error("No data matched: {0}")]
    NoDataMatched(String),

    #[error("Schema inference failed: {0}")]
    SchemaInference(String),

    #[error("Unsupported SQL dialect '{name}'. Supported dialects are: {allowed}")]
    UnsupportedDialect { name: String, allowed: String },

    #[error("SQL generation error: {0}")]
    Generation(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Output write error: {0}")]
    SinkWrite(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Short machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            ConvertError::FormatUnsupported(_) => "FORMAT_UNSUPPORTED",
            ConvertError::SourceRead(_) => "SOURCE_READ_ERROR",
            ConvertError::NoDataMatched(_) => "NO_DATA_MATCHED",
            ConvertError::SchemaInference(_) => "SCHEMA_INFERENCE_FAILURE",
            ConvertError::UnsupportedDialect { .. } => "UNSUPPORTED_DIALECT",
            ConvertError::Generation(_) => "GENERATION_ERROR",
            ConvertError::Transform(_) => "TRANSFORM_ERROR",
            ConvertError::SinkWrite(_) => "SINK_WRITE_ERROR",
            ConvertError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

/// Convert csv::Error to ConvertError
impl From<csv::Error> for ConvertError {
    fn from(err: csv::Error) -> Self {
        match err.position() {
            Some(pos) => ConvertError::SourceRead(format!(
                "failed to parse delimited record {}: {}",
                pos.record(),
                err
            )),
            None => ConvertError::SourceRead(format!("failed to read delimited file: {}", err)),
        }
    }
}

/// Convert rusqlite::Error to ConvertError
impl From<rusqlite::Error> for ConvertError {
    fn from(err: rusqlite::Error) -> Self {
        ConvertError::SourceRead(format!("SQLite error: {}", err))
    }
}

/// Convert calamine::Error to ConvertError
impl From<calamine::Error> for ConvertError {
    fn from(err: calamine::Error) -> Self {
        ConvertError::SourceRead(format!("failed to read spreadsheet: {}", err))
    }
}

/// I/O failures while reading a source; sink code maps its own I/O errors explicitly
impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        ConvertError::SourceRead(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_kind() {
        let err = ConvertError::NoDataMatched("selector 'items' matched nothing".to_string());
        assert_eq!(err.to_string(), "No data matched: selector 'items' matched nothing");
        assert_eq!(err.code(), "NO_DATA_MATCHED");
    }

    #[test]
    fn test_unsupported_dialect_lists_allowed() {
        let err = ConvertError::UnsupportedDialect {
            name: "db2".to_string(),
            allowed: "generic, mysql".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'db2'"));
        assert!(msg.contains("generic, mysql"));
    }

    #[test]
    fn test_io_error_maps_to_source_read() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let err: ConvertError = io.into();
        assert_eq!(err.code(), "SOURCE_READ_ERROR");
    }
}
