use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tab2sql::config::Config;
use tab2sql::error::ConvertError;
use tab2sql::output::{StatementSink, StreamingWriter};
use tab2sql::services::database::{open_database_source, ConnectionParams, DatabaseEngine, QuerySpec};
use tab2sql::services::dialect::dialect_for;
use tab2sql::services::pipeline::{self, RunOptions, RunSummary};
use tab2sql::services::source::{open_file_source, ApiRequest, ApiSource, FileFormat, RowSource};
use tab2sql::services::transform::{RuleTransform, Transform};

#[derive(Parser)]
#[command(
    name = "tab2sql",
    version,
    about = "Convert files, database tables and REST API responses into SQL INSERT statements"
)]
struct Cli {
    #[command(subcommand)]
    source: SourceCommand,
}

#[derive(Subcommand)]
enum SourceCommand {
    /// Use a file as input source
    File {
        /// Path to the input file (CSV, TSV, Excel, JSON, JSON Lines; optionally .gz)
        #[arg(long)]
        input: PathBuf,

        /// Force input format (auto, csv, excel, json, jsonl)
        #[arg(long, default_value = "auto")]
        format: String,

        /// Rows read per batch
        #[arg(long)]
        chunk_size: Option<usize>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Use a database as input source
    Db {
        /// Source database type (postgresql, mysql, sqlite, oracle, sqlserver)
        #[arg(long)]
        dialect: String,

        /// Full connection URL; replaces the individual connection options
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long, env = "TAB2SQL_DB_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Database name, or the file path for SQLite
        #[arg(long)]
        database: Option<String>,

        /// Database driver (SQL Server)
        #[arg(long)]
        driver: Option<String>,

        /// Table to read from
        #[arg(long, required_unless_present = "query")]
        source_table: Option<String>,

        /// Custom SELECT query (instead of --source-table)
        #[arg(long, conflicts_with_all = ["source_table", "where_clause"])]
        query: Option<String>,

        /// Maximum number of rows to read
        #[arg(long)]
        limit: Option<u64>,

        /// WHERE clause for filtering rows of --source-table
        #[arg(long = "where")]
        where_clause: Option<String>,

        /// Rows fetched per page
        #[arg(long)]
        chunk_size: Option<usize>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Use a REST API as input source
    Api {
        /// API endpoint URL
        #[arg(long)]
        url: String,

        /// HTTP method (GET or POST)
        #[arg(long, default_value = "GET")]
        method: String,

        /// HTTP headers as a JSON object
        #[arg(long)]
        headers: Option<String>,

        /// Basic auth credentials as username:password
        #[arg(long)]
        auth: Option<String>,

        /// JSON request payload
        #[arg(long)]
        data: Option<String>,

        /// Path to the records inside the response, e.g. $.data.items
        #[arg(long)]
        path: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

impl SourceCommand {
    fn common(&self) -> &CommonArgs {
        match self {
            SourceCommand::File { common, .. }
            | SourceCommand::Db { common, .. }
            | SourceCommand::Api { common, .. } => common,
        }
    }
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Output SQL file; `-` writes to stdout, a `.gz` suffix compresses
    #[arg(long)]
    output: String,

    /// Name of the SQL table to insert into
    #[arg(long)]
    table: String,

    /// SQL dialect for output (generic, mysql, postgres, sqlite, oracle, sqlserver)
    #[arg(long)]
    sql_dialect: Option<String>,

    /// Generate a CREATE TABLE statement
    #[arg(long)]
    create_table: bool,

    /// Number of rows per INSERT statement
    #[arg(long, allow_negative_numbers = true)]
    batch_size: Option<i64>,

    /// Path to a JSON transformation config file
    #[arg(long)]
    transform: Option<PathBuf>,

    /// Fail if the source cannot be read incrementally
    #[arg(long)]
    strict_streaming: bool,

    /// Show full error details
    #[arg(long)]
    debug: bool,
}

/// `--debug` wins over `RUST_LOG`, which wins over the configured level
fn log_filter(config: &Config, debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
}

fn init_logging(config: &Config, debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(config, debug))
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi_logs())
        .init();
}

async fn open_source(command: &SourceCommand, config: &Config) -> tab2sql::Result<Box<dyn RowSource>> {
    match command {
        SourceCommand::File {
            input,
            format,
            chunk_size,
            ..
        } => open_file_source(
            input,
            FileFormat::from_str(format)?,
            chunk_size.unwrap_or(config.conversion.chunk_size),
        ),
        SourceCommand::Db {
            dialect,
            url,
            host,
            port,
            user,
            password,
            database,
            driver,
            source_table,
            query,
            limit,
            where_clause,
            chunk_size,
            ..
        } => {
            let engine = DatabaseEngine::from_str(dialect)?;
            let params = ConnectionParams {
                url: url.clone(),
                host: host.clone(),
                port: *port,
                user: user.clone(),
                password: password.clone(),
                database: database.clone(),
                driver: driver.clone(),
            };
            let spec = QuerySpec {
                table: source_table.clone(),
                query: query.clone(),
                where_clause: where_clause.clone(),
                limit: *limit,
            };
            open_database_source(
                engine,
                &params,
                &spec,
                chunk_size.unwrap_or(config.conversion.chunk_size),
            )
            .await
        }
        SourceCommand::Api {
            url,
            method,
            headers,
            auth,
            data,
            path,
            ..
        } => {
            let source = ApiSource::new(ApiRequest {
                url: url.clone(),
                method: method.clone(),
                headers: headers.clone(),
                auth: auth.clone(),
                data: data.clone(),
                path: path.clone(),
                timeout_secs: config.http.timeout_secs,
            })?;
            Ok(Box::new(source))
        }
    }
}

async fn execute(cli: &Cli, config: &Config) -> anyhow::Result<RunSummary> {
    let common = cli.source.common();
    let options = RunOptions {
        table: common.table.clone(),
        dialect: common
            .sql_dialect
            .clone()
            .unwrap_or_else(|| config.conversion.sql_dialect.clone()),
        create_table: common.create_table,
        batch_size: common.batch_size.unwrap_or(config.conversion.batch_size),
        strict_streaming: common.strict_streaming || config.conversion.strict_streaming,
    };

    // Cheap checks first, before any connection or output file exists
    dialect_for(&options.dialect)?;
    let transform = common
        .transform
        .as_ref()
        .map(RuleTransform::from_file)
        .transpose()?;

    let mut source = open_source(&cli.source, config).await?;
    let description = source.describe();
    info!("Reading from {}", description);

    let mut sink = match StreamingWriter::create(&common.output) {
        Ok(sink) => sink,
        Err(e) => {
            if let Err(close_err) = source.close().await {
                error!("{}", close_err);
            }
            return Err(e.into());
        }
    };

    let summary = pipeline::run(
        source.as_mut(),
        transform.as_ref().map(|t| t as &dyn Transform),
        &mut sink as &mut dyn StatementSink,
        &options,
    )
    .await
    .with_context(|| format!("converting {}", description))?;

    Ok(summary)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let debug = cli.source.common().debug;

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    init_logging(&config, debug);

    match execute(&cli, &config).await {
        Ok(summary) => {
            eprintln!(
                "Processed {} rows into {} SQL statements",
                summary.rows_processed, summary.statements_emitted
            );
        }
        Err(e) => {
            let code = e
                .downcast_ref::<ConvertError>()
                .map(ConvertError::code)
                .unwrap_or("UNEXPECTED_ERROR");
            if debug {
                eprintln!("Error [{}]: {:?}", code, e);
            } else {
                eprintln!("Error [{}]: {:#}", code, e);
                eprintln!("Run with --debug for more information.");
            }
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_overrides_env_filter() {
        std::env::set_var("RUST_LOG", "error");
        let config = Config::from_env().unwrap();
        assert_eq!(log_filter(&config, true).to_string(), "debug");
        assert_eq!(log_filter(&config, false).to_string(), "error");
        std::env::remove_var("RUST_LOG");
    }
}
