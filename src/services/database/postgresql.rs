// PostgreSQL row source
//
// The query runs once inside a read-only transaction and its rows are fetched
// through a portal, `chunk_size` rows per round trip.
use std::error::Error as StdError;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, NoTls, Row as PgRow};

use super::cursor::{BatchFeed, BatchSender, RowCap};
use super::{mask_credentials, ReadPlan};
use crate::error::{ConvertError, Result};
use crate::models::{Batch, Row, Value};
use crate::services::source::RowSource;

pub struct PostgreSQLSource {
    feed: BatchFeed,
    connection: Option<JoinHandle<()>>,
    display_url: String,
}

impl PostgreSQLSource {
    pub async fn connect(connection_url: &str, plan: ReadPlan) -> Result<Self> {
        let display_url = mask_credentials(connection_url);
        let (client, connection) = tokio_postgres::connect(connection_url, NoTls)
            .await
            .map_err(|e| {
                ConvertError::SourceRead(format!("Failed to connect to PostgreSQL at {}: {}", display_url, e))
            })?;

        // The connection object drives the socket and must be polled separately
        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        tracing::info!("Connected to PostgreSQL at {}", display_url);
        Ok(Self {
            feed: BatchFeed::spawn(move |out| read_portal(client, plan, out)),
            connection: Some(handle),
            display_url,
        })
    }
}

fn query_error(e: tokio_postgres::Error) -> ConvertError {
    ConvertError::SourceRead(format!("PostgreSQL query failed: {}", e))
}

async fn read_portal(mut client: Client, plan: ReadPlan, mut out: BatchSender) -> Result<()> {
    let transaction = client
        .build_transaction()
        .read_only(true)
        .start()
        .await
        .map_err(query_error)?;
    let statement = transaction.prepare(&plan.query).await.map_err(query_error)?;
    out.set_columns(statement.columns().iter().map(|c| c.name().to_string()).collect());
    let portal = transaction.bind(&statement, &[]).await.map_err(query_error)?;

    let mut cap = RowCap::new(plan.limit);
    let mut pending = Vec::new();
    while !cap.exhausted() {
        let want = cap.next_fetch(plan.chunk_size);
        let max_rows = i32::try_from(want).unwrap_or(i32::MAX);
        let rows = transaction
            .query_portal(&portal, max_rows)
            .await
            .map_err(query_error)?;
        cap.consume(rows.len());
        let short = rows.len() < want;

        let values = rows.iter().map(pg_row).collect::<Result<Vec<_>>>()?;
        tracing::debug!("Fetched {} rows from PostgreSQL", values.len());
        if short {
            pending = values;
            break;
        }
        if !out.send(values).await {
            return Ok(());
        }
    }
    out.finish(pending).await;

    transaction.rollback().await.map_err(query_error)?;
    Ok(())
}

fn pg_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let raw = row
                .try_get::<_, RawCell>(idx)
                .map_err(|e| ConvertError::SourceRead(format!("cannot read column '{}': {}", column.name(), e)))?;
            decode_cell(column.type_(), raw.0).map_err(|e| match e {
                ConvertError::SourceRead(msg) => {
                    ConvertError::SourceRead(format!("column '{}': {}", column.name(), msg))
                }
                other => other,
            })
        })
        .collect()
}

/// The undecoded wire bytes of one cell, `None` for NULL
struct RawCell<'a>(Option<&'a [u8]>);

impl<'a> FromSql<'a> for RawCell<'a> {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(RawCell(Some(raw)))
    }

    fn from_sql_null(_: &Type) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(RawCell(None))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// INTERVAL in its binary form: microseconds, days, months
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    micros: i64,
    days: i32,
    months: i32,
}

impl<'a> FromSql<'a> for Interval {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        if raw.len() != 16 {
            return Err(format!("invalid interval length {}", raw.len()).into());
        }
        let mut micros = [0u8; 8];
        let mut days = [0u8; 4];
        let mut months = [0u8; 4];
        micros.copy_from_slice(&raw[0..8]);
        days.copy_from_slice(&raw[8..12]);
        months.copy_from_slice(&raw[12..16]);
        Ok(Interval {
            micros: i64::from_be_bytes(micros),
            days: i32::from_be_bytes(days),
            months: i32::from_be_bytes(months),
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

impl Interval {
    /// ISO 8601 duration, e.g. `P1M2DT3.5S`
    fn to_iso8601(self) -> String {
        let sign = if self.micros < 0 { "-" } else { "" };
        let abs = self.micros.unsigned_abs();
        let (secs, frac) = (abs / 1_000_000, abs % 1_000_000);
        let seconds = if frac == 0 {
            format!("{}{}", sign, secs)
        } else {
            let frac = format!("{:06}", frac);
            format!("{}{}.{}", sign, secs, frac.trim_end_matches('0'))
        };
        format!("P{}M{}DT{}S", self.months, self.days, seconds)
    }
}

fn decode<'a, T: FromSql<'a>>(ty: &Type, raw: Option<&'a [u8]>) -> Result<Option<T>> {
    Option::<T>::from_sql_nullable(ty, raw)
        .map_err(|e| ConvertError::SourceRead(format!("cannot decode {} value: {}", ty.name(), e)))
}

/// Convert one PostgreSQL cell into a neutral value.
///
/// NUMERIC keeps its exact digits as text; JSON, UUID, TIME and INTERVAL are
/// rendered as their canonical text.
fn decode_cell(ty: &Type, raw: Option<&[u8]>) -> Result<Value> {
    let value = match *ty {
        Type::BOOL => decode::<bool>(ty, raw)?.map(Value::Bool),
        Type::INT2 => decode::<i16>(ty, raw)?.map(|v| Value::Int(v as i64)),
        Type::INT4 => decode::<i32>(ty, raw)?.map(|v| Value::Int(v as i64)),
        Type::INT8 => decode::<i64>(ty, raw)?.map(Value::Int),
        Type::OID => decode::<u32>(ty, raw)?.map(|v| Value::Int(v as i64)),
        Type::FLOAT4 => decode::<f32>(ty, raw)?.map(|v| Value::Float(v as f64)),
        Type::FLOAT8 => decode::<f64>(ty, raw)?.map(Value::Float),
        Type::NUMERIC => decode::<Decimal>(ty, raw)?.map(|d| Value::Text(d.to_string())),
        Type::DATE => decode::<chrono::NaiveDate>(ty, raw)?.map(Value::Date),
        Type::TIMESTAMP => decode::<chrono::NaiveDateTime>(ty, raw)?.map(Value::DateTime),
        Type::TIMESTAMPTZ => decode::<chrono::DateTime<chrono::Utc>>(ty, raw)?
            .map(|ts| Value::DateTime(ts.naive_utc())),
        Type::TIME => decode::<chrono::NaiveTime>(ty, raw)?.map(|t| Value::Text(t.to_string())),
        Type::INTERVAL => decode::<Interval>(ty, raw)?.map(|i| Value::Text(i.to_iso8601())),
        Type::UUID => decode::<uuid::Uuid>(ty, raw)?.map(|u| Value::Text(u.to_string())),
        Type::JSON | Type::JSONB => decode::<serde_json::Value>(ty, raw)?.map(|j| Value::Text(j.to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            decode::<String>(ty, raw)?.map(Value::Text)
        }
        ref other => {
            return Err(ConvertError::SourceRead(format!(
                "unsupported type {}; cast it to text in a custom query",
                other.name()
            )))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

#[async_trait::async_trait]
impl RowSource for PostgreSQLSource {
    fn describe(&self) -> String {
        format!("PostgreSQL {}", self.display_url)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        self.feed.next().await
    }

    async fn close(&mut self) -> Result<()> {
        self.feed.stop();
        if let Some(handle) = self.connection.take() {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_decode_scalars_and_null() {
        assert_eq!(decode_cell(&Type::INT4, Some(&42i32.to_be_bytes())).unwrap(), Value::Int(42));
        assert_eq!(decode_cell(&Type::BOOL, Some(&[1])).unwrap(), Value::Bool(true));
        assert_eq!(decode_cell(&Type::TEXT, Some(b"hi")).unwrap(), Value::from("hi"));
        assert_eq!(decode_cell(&Type::NUMERIC, None).unwrap(), Value::Null);
        // days since 2000-01-01
        assert_eq!(
            decode_cell(&Type::DATE, Some(&31i32.to_be_bytes())).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2000, 2, 1).unwrap())
        );
    }

    #[test]
    fn test_decode_numeric_keeps_exact_digits() {
        // ndigits=2, weight=0, sign=+, dscale=2, base-10000 digits [12, 3400]
        let raw = [0, 2, 0, 0, 0, 0, 0, 2, 0, 12, 0x0d, 0x48];
        assert_eq!(decode_cell(&Type::NUMERIC, Some(&raw)).unwrap(), Value::from("12.34"));
    }

    #[test]
    fn test_decode_json_and_uuid_as_text() {
        let mut jsonb = vec![1u8];
        jsonb.extend_from_slice(br#"{"a": [1, 2]}"#);
        assert_eq!(decode_cell(&Type::JSONB, Some(&jsonb)).unwrap(), Value::from(r#"{"a":[1,2]}"#));
        assert_eq!(decode_cell(&Type::JSON, Some(b"true")).unwrap(), Value::from("true"));

        let id = uuid::Uuid::from_u128(0x67e5_5044_10b1_426f_9247_bb68_0e5f_e0c8);
        assert_eq!(
            decode_cell(&Type::UUID, Some(id.as_bytes())).unwrap(),
            Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
    }

    #[test]
    fn test_decode_time_and_interval() {
        let micros: i64 = (13 * 3600 + 5 * 60 + 9) * 1_000_000;
        assert_eq!(decode_cell(&Type::TIME, Some(&micros.to_be_bytes())).unwrap(), Value::from("13:05:09"));

        let mut raw = Vec::new();
        raw.extend_from_slice(&3_500_000i64.to_be_bytes());
        raw.extend_from_slice(&2i32.to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        assert_eq!(decode_cell(&Type::INTERVAL, Some(&raw)).unwrap(), Value::from("P1M2DT3.5S"));
    }

    #[test]
    fn test_unsupported_type_asks_for_cast() {
        let err = decode_cell(&Type::BYTEA, Some(&[0xde, 0xad])).unwrap_err();
        assert!(matches!(err, ConvertError::SourceRead(_)));
        assert!(err.to_string().contains("cast it to text"));
    }
}
