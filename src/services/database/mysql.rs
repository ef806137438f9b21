// MySQL row source using connection pooling
//
// The query is executed once and its rows are read off the binary protocol
// stream as they arrive.
use chrono::NaiveDate;
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Conn, Opts, Pool, Row as MySqlRow, Value as MySqlValue};

use super::cursor::{BatchFeed, BatchSender, RowCap};
use super::{mask_credentials, ReadPlan};
use crate::error::{ConvertError, Result};
use crate::models::{Batch, Row, Value};
use crate::services::source::RowSource;

pub struct MySQLSource {
    pool: Option<Pool>,
    feed: BatchFeed,
    display_url: String,
}

fn query_error(e: mysql_async::Error) -> ConvertError {
    ConvertError::SourceRead(format!("MySQL query failed: {}", e))
}

impl MySQLSource {
    pub async fn connect(connection_url: &str, plan: ReadPlan) -> Result<Self> {
        let opts = Opts::from_url(connection_url)
            .map_err(|e| ConvertError::Validation(format!("Invalid MySQL URL: {}", e)))?;
        let display_url = mask_credentials(connection_url);

        let pool = Pool::new(opts);
        let conn = pool.get_conn().await.map_err(|e| {
            ConvertError::SourceRead(format!("Failed to get MySQL connection for {}: {}", display_url, e))
        })?;

        tracing::info!("Connected to MySQL at {}", display_url);
        Ok(Self {
            pool: Some(pool),
            feed: BatchFeed::spawn(move |out| read_stream(conn, plan, out)),
            display_url,
        })
    }

    /// Convert one result row, column by column
    fn mysql_row(columns: &[(String, ColumnType)], row: MySqlRow) -> Result<Row> {
        let mut out = Vec::with_capacity(columns.len());
        for (idx, (name, column_type)) in columns.iter().enumerate() {
            let value = match row.get_opt::<MySqlValue, usize>(idx) {
                Some(Ok(v)) => Self::mysql_value(name, *column_type, v)?,
                Some(Err(_)) | None => Value::Null,
            };
            out.push(value);
        }
        Ok(out)
    }

    /// Helper function to convert a MySQL value into a neutral value
    fn mysql_value(name: &str, column_type: ColumnType, value: MySqlValue) -> Result<Value> {
        Ok(match value {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => Value::Text(s),
                Err(_) => {
                    return Err(ConvertError::SourceRead(format!(
                        "column '{}' holds binary data; cast it to text in a custom query",
                        name
                    )))
                }
            },
            MySqlValue::Int(i) => Value::Int(i),
            MySqlValue::UInt(u) => match i64::try_from(u) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(u.to_string()),
            },
            MySqlValue::Float(f) => Value::Float(f as f64),
            MySqlValue::Double(d) => Value::Float(d),
            MySqlValue::Date(y, m, d, h, min, s, micros) => {
                // Zero dates (0000-00-00) have no calendar value
                let Some(date) = NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32) else {
                    return Ok(Value::Null);
                };
                if column_type == ColumnType::MYSQL_TYPE_DATE {
                    Value::Date(date)
                } else {
                    date.and_hms_micro_opt(h as u32, min as u32, s as u32, micros)
                        .map(Value::DateTime)
                        .unwrap_or(Value::Null)
                }
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                Value::Text(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        })
    }
}

async fn read_stream(mut conn: Conn, plan: ReadPlan, mut out: BatchSender) -> Result<()> {
    let mut result = conn.exec_iter(plan.query.as_str(), ()).await.map_err(query_error)?;
    let columns: Vec<(String, ColumnType)> = result
        .columns_ref()
        .iter()
        .map(|c| (c.name_str().to_string(), c.column_type()))
        .collect();
    out.set_columns(columns.iter().map(|(name, _)| name.clone()).collect());

    let chunk_size = plan.chunk_size.max(1);
    let mut cap = RowCap::new(plan.limit);
    let mut pending: Vec<Row> = Vec::with_capacity(chunk_size);
    while !cap.exhausted() {
        let Some(row) = result.next().await.map_err(query_error)? else {
            break;
        };
        cap.consume(1);
        pending.push(MySQLSource::mysql_row(&columns, row)?);
        if pending.len() == chunk_size {
            tracing::debug!("Fetched {} rows from MySQL", pending.len());
            let full = std::mem::replace(&mut pending, Vec::with_capacity(chunk_size));
            if !out.send(full).await {
                return Ok(());
            }
        }
    }
    out.finish(pending).await;
    Ok(())
}

#[async_trait::async_trait]
impl RowSource for MySQLSource {
    fn describe(&self) -> String {
        format!("MySQL {}", self.display_url)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        self.feed.next().await
    }

    async fn close(&mut self) -> Result<()> {
        self.feed.stop();
        if let Some(pool) = self.pool.take() {
            pool.disconnect()
                .await
                .map_err(|e| ConvertError::SourceRead(format!("Failed to close MySQL pool: {}", e)))?;
        }
        Ok(())
    }
}
