// SQL dialects
//
// Defines the trait and implementations for rendering literals, identifiers
// and statements for each supported target database.

use std::sync::Arc;

use crate::error::{ConvertError, Result};
use crate::models::value::{format_date, format_datetime};
use crate::models::{ColumnSchema, Row, SemanticType, SqlStatement, Value};

/// Names accepted by [`dialect_for`]
pub const SUPPORTED_DIALECTS: &[&str] = &["generic", "mysql", "postgres", "sqlite", "oracle", "sqlserver"];

/// Words the generic dialect refuses to emit as bare identifiers
const GENERIC_RESERVED: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "CREATE", "DEFAULT", "DELETE",
    "DESC", "DISTINCT", "DROP", "ELSE", "END", "FOREIGN", "FROM", "GROUP", "HAVING", "IN",
    "INDEX", "INSERT", "INTO", "IS", "JOIN", "KEY", "LIKE", "LIMIT", "NOT", "NULL", "ON", "OR",
    "ORDER", "PRIMARY", "REFERENCES", "SELECT", "TABLE", "THEN", "TO", "UNION", "UNIQUE",
    "UPDATE", "USER", "VALUES", "WHEN", "WHERE", "WITH",
];

/// Strategy for one target SQL dialect
///
/// Implementations only decide the dialect-specific pieces (quoting, escaping,
/// boolean literals, column types). Value formatting and statement skeletons
/// are shared through the provided methods and may be overridden.
pub trait SqlDialect: Send + Sync {
    /// Canonical dialect name (e.g. "postgres")
    fn name(&self) -> &'static str;

    /// Quote a single identifier. Must be applied exactly once per name.
    fn quote_identifier(&self, name: &str) -> String;

    /// Native column type for a semantic type
    fn column_type(&self, semantic_type: SemanticType) -> &'static str;

    fn boolean_literal(&self, value: bool) -> &'static str;

    /// Most value groups one INSERT may carry, if the server enforces a limit
    fn max_rows_per_insert(&self) -> Option<usize> {
        None
    }

    /// Escape the body of a single-quoted string literal
    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", self.escape_string(s))
    }

    /// Quote a possibly schema-qualified table name, one part at a time
    fn quote_table(&self, table: &str) -> String {
        table
            .split('.')
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render a literal under its column's semantic type.
    ///
    /// # Errors
    /// Returns `ConvertError::Generation` when the value does not satisfy the
    /// type; values are never silently stringified across types.
    fn format_value(&self, value: &Value, semantic_type: SemanticType) -> Result<String> {
        let rendered = match (semantic_type, value) {
            (_, Value::Null) => return Ok("NULL".to_string()),
            (SemanticType::Integer, v) => v.as_integer().map(|i| i.to_string()),
            // integers keep their exact digits instead of a lossy f64 round trip
            (SemanticType::Float, Value::Int(i)) => Some(i.to_string()),
            (SemanticType::Float, Value::Text(s)) => value.as_float().map(|_| s.trim().to_string()),
            (SemanticType::Float, v) => v.as_float().map(|f| f.to_string()),
            (SemanticType::Boolean, v) => v.as_bool().map(|b| self.boolean_literal(b).to_string()),
            (SemanticType::Date, v) => v.as_date().map(|d| self.quote_string(&format_date(&d))),
            (SemanticType::DateTime, v) => v
                .as_datetime()
                .map(|dt| self.quote_string(&format_datetime(&dt))),
            (SemanticType::Text, Value::Text(s)) => Some(self.quote_string(s)),
            (SemanticType::Text, v) => Some(self.quote_string(&v.to_string())),
        };

        rendered.ok_or_else(|| {
            ConvertError::Generation(format!(
                "cannot render {} value '{}' as {}",
                value.kind(),
                value,
                semantic_type
            ))
        })
    }

    fn create_table_statement(&self, table: &str, schema: &ColumnSchema) -> SqlStatement {
        let defs: Vec<String> = schema
            .columns()
            .iter()
            .map(|c| {
                format!(
                    "{} {}",
                    self.quote_identifier(&c.name),
                    self.column_type(c.semantic_type)
                )
            })
            .collect();
        SqlStatement::new(format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_table(table),
            defs.join(",\n  ")
        ))
    }

    /// Format one row as a parenthesised value group in schema order
    fn value_group(&self, schema: &ColumnSchema, row: &Row) -> Result<String> {
        let values = schema
            .columns()
            .iter()
            .zip(row.iter())
            .map(|(col, value)| {
                self.format_value(value, col.semantic_type).map_err(|e| match e {
                    ConvertError::Generation(msg) => {
                        ConvertError::Generation(format!("column '{}': {}", col.name, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("({})", values.join(", ")))
    }

    fn column_list(&self, schema: &ColumnSchema) -> String {
        schema
            .columns()
            .iter()
            .map(|c| self.quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// One INSERT carrying every row of `rows` as its own value group
    fn insert_statement(&self, table: &str, schema: &ColumnSchema, rows: &[Row]) -> Result<SqlStatement> {
        if rows.is_empty() {
            return Err(ConvertError::Generation(
                "cannot build an INSERT without rows".to_string(),
            ));
        }
        let groups = rows
            .iter()
            .map(|row| self.value_group(schema, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(SqlStatement::new(format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_table(table),
            self.column_list(schema),
            groups.join(", ")
        )))
    }
}

/// Wrap `name` in `open`/`close`, doubling any embedded closing character
fn wrap_identifier(name: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push(open);
    for ch in name.chars() {
        if ch == close {
            out.push(close);
        }
        out.push(ch);
    }
    out.push(close);
    out
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !GENERIC_RESERVED.contains(&name.to_ascii_uppercase().as_str())
}

/// Portable SQL: bare identifiers when safe, standard quoting otherwise
pub struct GenericDialect;

impl SqlDialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn quote_identifier(&self, name: &str) -> String {
        if is_plain_identifier(name) {
            name.to_string()
        } else {
            wrap_identifier(name, '"', '"')
        }
    }

    fn column_type(&self, semantic_type: SemanticType) -> &'static str {
        match semantic_type {
            SemanticType::Integer => "INTEGER",
            SemanticType::Float => "FLOAT",
            SemanticType::Boolean => "BOOLEAN",
            SemanticType::Date => "DATE",
            SemanticType::DateTime => "TIMESTAMP",
            SemanticType::Text => "TEXT",
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }
}

/// MySQL / MariaDB
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        wrap_identifier(name, '`', '`')
    }

    fn column_type(&self, semantic_type: SemanticType) -> &'static str {
        match semantic_type {
            SemanticType::Integer => "INT",
            SemanticType::Float => "DOUBLE",
            SemanticType::Boolean => "BOOLEAN",
            SemanticType::Date => "DATE",
            SemanticType::DateTime => "DATETIME",
            SemanticType::Text => "TEXT",
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    // MySQL treats backslash as an escape character inside string literals
    fn escape_string(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for ch in s.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                _ => out.push(ch),
            }
        }
        out
    }
}

/// PostgreSQL
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, name: &str) -> String {
        wrap_identifier(name, '"', '"')
    }

    fn column_type(&self, semantic_type: SemanticType) -> &'static str {
        match semantic_type {
            SemanticType::Integer => "INTEGER",
            SemanticType::Float => "DOUBLE PRECISION",
            SemanticType::Boolean => "BOOLEAN",
            SemanticType::Date => "DATE",
            SemanticType::DateTime => "TIMESTAMP",
            SemanticType::Text => "TEXT",
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }
}

/// SQLite. No native boolean or date types: 1/0 and ISO text.
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, name: &str) -> String {
        wrap_identifier(name, '"', '"')
    }

    fn column_type(&self, semantic_type: SemanticType) -> &'static str {
        match semantic_type {
            SemanticType::Integer | SemanticType::Boolean => "INTEGER",
            SemanticType::Float => "REAL",
            SemanticType::Date | SemanticType::DateTime | SemanticType::Text => "TEXT",
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }
}

/// Oracle. Multi-row inserts use `INSERT ALL ... SELECT 1 FROM DUAL`.
pub struct OracleDialect;

impl SqlDialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn quote_identifier(&self, name: &str) -> String {
        wrap_identifier(name, '"', '"')
    }

    fn column_type(&self, semantic_type: SemanticType) -> &'static str {
        match semantic_type {
            SemanticType::Integer => "NUMBER",
            SemanticType::Float => "BINARY_DOUBLE",
            SemanticType::Boolean => "NUMBER(1)",
            SemanticType::Date => "DATE",
            SemanticType::DateTime => "TIMESTAMP",
            SemanticType::Text => "CLOB",
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn insert_statement(&self, table: &str, schema: &ColumnSchema, rows: &[Row]) -> Result<SqlStatement> {
        let (first, rest) = rows.split_first().ok_or_else(|| {
            ConvertError::Generation("cannot build an INSERT without rows".to_string())
        })?;
        let target = format!("{} ({})", self.quote_table(table), self.column_list(schema));

        if rest.is_empty() {
            return Ok(SqlStatement::new(format!(
                "INSERT INTO {} VALUES {}",
                target,
                self.value_group(schema, first)?
            )));
        }

        let mut sql = String::from("INSERT ALL");
        for row in rows {
            sql.push_str(&format!(" INTO {} VALUES {}", target, self.value_group(schema, row)?));
        }
        sql.push_str(" SELECT 1 FROM DUAL");
        Ok(SqlStatement::new(sql))
    }
}

/// Microsoft SQL Server
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_identifier(&self, name: &str) -> String {
        wrap_identifier(name, '[', ']')
    }

    fn column_type(&self, semantic_type: SemanticType) -> &'static str {
        match semantic_type {
            SemanticType::Integer => "INT",
            SemanticType::Float => "FLOAT",
            SemanticType::Boolean => "BIT",
            SemanticType::Date => "DATE",
            SemanticType::DateTime => "DATETIME2",
            SemanticType::Text => "NVARCHAR(MAX)",
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    // a VALUES list is limited to 1000 row value expressions
    fn max_rows_per_insert(&self) -> Option<usize> {
        Some(1000)
    }
}

/// Look up a dialect by name (case-insensitive, common aliases accepted)
pub fn dialect_for(name: &str) -> Result<Arc<dyn SqlDialect>> {
    match name.trim().to_lowercase().as_str() {
        "generic" => Ok(Arc::new(GenericDialect)),
        "mysql" | "mariadb" => Ok(Arc::new(MySqlDialect)),
        "postgres" | "postgresql" | "pg" => Ok(Arc::new(PostgresDialect)),
        "sqlite" => Ok(Arc::new(SqliteDialect)),
        "oracle" => Ok(Arc::new(OracleDialect)),
        "sqlserver" | "mssql" => Ok(Arc::new(SqlServerDialect)),
        _ => Err(ConvertError::UnsupportedDialect {
            name: name.to_string(),
            allowed: SUPPORTED_DIALECTS.join(", "),
        }),
    }
}
