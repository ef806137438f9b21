// SQLite row source
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use super::Pager;
use crate::error::{ConvertError, Result};
use crate::models::{Batch, Value};
use crate::services::source::RowSource;

pub struct SqliteSource {
    conn: Option<Connection>,
    pager: Pager,
    path: String,
}

impl SqliteSource {
    /// Open a database file read-only. Accepts a plain path or a
    /// `sqlite:` / `sqlite://` URL.
    pub fn open(location: &str, pager: Pager) -> Result<Self> {
        let path = location
            .strip_prefix("sqlite:")
            .map(|p| p.trim_start_matches("//"))
            .unwrap_or(location);

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(|e| {
            ConvertError::SourceRead(format!("Failed to open SQLite database '{}': {}", path, e))
        })?;

        tracing::info!("Opened SQLite database {}", path);
        Ok(Self {
            conn: Some(conn),
            pager,
            path: path.to_string(),
        })
    }

    fn fetch_page(&self, sql: &str) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| ConvertError::SourceRead("SQLite source is closed".to_string()))?;

        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;

        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                out.push(match row.get_ref(idx)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(i) => Value::Int(i),
                    ValueRef::Real(f) => Value::Float(f),
                    ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(_) => {
                        return Err(ConvertError::SourceRead(format!(
                            "column '{}' holds binary data; cast it to text in a custom query",
                            name
                        )))
                    }
                });
            }
            values.push(out);
        }
        Ok((columns, values))
    }
}

#[async_trait::async_trait]
impl RowSource for SqliteSource {
    fn describe(&self) -> String {
        format!("SQLite '{}'", self.path)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        let Some(sql) = self.pager.next_query() else {
            return Ok(None);
        };
        let (columns, values) = self.fetch_page(&sql)?;

        let first_page = self.pager.is_first_page();
        self.pager.advance(values.len());
        if values.is_empty() && !first_page {
            return Ok(None);
        }
        tracing::debug!("Fetched {} rows from SQLite", values.len());
        Batch::try_new(columns, values).map(Some)
    }

    async fn close(&mut self) -> Result<()> {
        self.pager.finish();
        self.conn = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::{open_database_source, ConnectionParams, DatabaseEngine, QuerySpec};

    fn fixture(rows: i64) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("src.db")).unwrap();
        conn.execute("CREATE TABLE items (id INTEGER, name TEXT, price REAL, payload BLOB)", [])
            .unwrap();
        for i in 1..=rows {
            conn.execute(
                "INSERT INTO items (id, name, price) VALUES (?1, ?2, ?3)",
                rusqlite::params![i, format!("item {}", i), i as f64 * 1.5],
            )
            .unwrap();
        }
        dir
    }

    fn open(dir: &tempfile::TempDir, base: &str, chunk: usize, limit: Option<u64>) -> SqliteSource {
        let path = dir.path().join("src.db");
        let location = format!("sqlite://{}", path.display());
        SqliteSource::open(&location, Pager::new(base.to_string(), chunk, limit)).unwrap()
    }

    #[tokio::test]
    async fn test_pages_through_table() {
        let dir = fixture(5);
        let mut src = open(&dir, "SELECT id, name, price FROM items ORDER BY id", 2, None);
        let mut sizes = Vec::new();
        let mut first = None;
        while let Some(batch) = src.next_batch().await.unwrap() {
            sizes.push(batch.len());
            first.get_or_insert(batch);
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        let first = first.unwrap();
        assert_eq!(first.columns(), &["id".to_string(), "name".to_string(), "price".to_string()]);
        assert_eq!(first.rows()[1], vec![Value::Int(2), Value::from("item 2"), Value::Float(3.0)]);
        src.close().await.unwrap();
        src.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_limit_caps_rows() {
        let dir = fixture(5);
        let mut src = open(&dir, "SELECT id FROM items", 2, Some(3));
        let mut total = 0;
        while let Some(batch) = src.next_batch().await.unwrap() {
            total += batch.len();
        }
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_empty_result_keeps_columns() {
        let dir = fixture(0);
        let mut src = open(&dir, "SELECT id, name FROM items", 10, None);
        let batch = src.next_batch().await.unwrap().unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.columns().len(), 2);
        assert!(src.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blob_is_source_error() {
        let dir = fixture(0);
        let conn = Connection::open(dir.path().join("src.db")).unwrap();
        conn.execute("INSERT INTO items (id, payload) VALUES (1, x'00ff')", []).unwrap();
        drop(conn);

        let mut src = open(&dir, "SELECT payload FROM items", 10, None);
        let err = src.next_batch().await.unwrap_err();
        assert!(matches!(err, ConvertError::SourceRead(_)));
    }

    #[tokio::test]
    async fn test_custom_query_with_trailing_comment() {
        let dir = fixture(3);
        let params = ConnectionParams {
            database: Some(dir.path().join("src.db").display().to_string()),
            ..Default::default()
        };
        let spec = QuerySpec {
            query: Some("SELECT id FROM items -- all rows".to_string()),
            ..Default::default()
        };
        let mut src = open_database_source(DatabaseEngine::SQLite, &params, &spec, 2).await.unwrap();
        let mut total = 0;
        while let Some(batch) = src.next_batch().await.unwrap() {
            total += batch.len();
        }
        assert_eq!(total, 3);
    }
}
