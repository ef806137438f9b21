use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub conversion: ConversionConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversionConfig {
    /// Rows per source batch
    pub chunk_size: usize,
    /// Rows per INSERT statement
    pub batch_size: i64,
    pub sql_dialect: String,
    pub strict_streaming: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("conversion.chunk_size", 10_000)?
            .set_default("conversion.batch_size", 1)?
            .set_default("conversion.sql_dialect", "generic")?
            .set_default("conversion.strict_streaming", false)?
            .set_default("http.timeout_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        // Load from environment variables
        if let Ok(chunk_size) = env::var("TAB2SQL_CHUNK_SIZE") {
            builder = builder.set_override("conversion.chunk_size", chunk_size)?;
        }

        if let Ok(batch_size) = env::var("TAB2SQL_BATCH_SIZE") {
            builder = builder.set_override("conversion.batch_size", batch_size)?;
        }

        if let Ok(dialect) = env::var("TAB2SQL_SQL_DIALECT") {
            builder = builder.set_override("conversion.sql_dialect", dialect)?;
        }

        if let Ok(strict) = env::var("TAB2SQL_STRICT_STREAMING") {
            builder = builder.set_override("conversion.strict_streaming", strict)?;
        }

        if let Ok(timeout) = env::var("TAB2SQL_HTTP_TIMEOUT") {
            builder = builder.set_override("http.timeout_secs", timeout)?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Whether log output may use ANSI colors
    pub fn ansi_logs(&self) -> bool {
        !self.logging.style.eq_ignore_ascii_case("never")
    }
}
