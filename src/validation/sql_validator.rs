use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{ConvertError, Result};

/// SQL validation for custom source queries
pub struct SqlValidator;

impl SqlValidator {
    /// Validate that a custom query is a single read-only SELECT and return it
    /// re-rendered from its syntax tree: no terminator and no comments, ready to
    /// be wrapped as a subquery
    pub fn validate_select_only(sql: &str) -> Result<String> {
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(sql)
            .map_err(|e| ConvertError::Validation(format!("SQL parsing error: {}", e)))?;

        let ast = parser
            .parse_statements()
            .map_err(|e| ConvertError::Validation(format!("SQL parsing error: {}", e)))?;

        match ast.as_slice() {
            [] => Err(ConvertError::Validation("Empty SQL query".to_string())),
            [statement @ Statement::Query(_)] => Ok(statement.to_string()),
            [_] => Err(ConvertError::Validation(
                "Only SELECT queries are permitted as a source query".to_string(),
            )),
            _ => Err(ConvertError::Validation(
                "A source query must be a single statement".to_string(),
            )),
        }
    }

    /// Check if a query has a LIMIT clause using AST analysis
    pub fn has_limit(sql: &str) -> bool {
        let dialect = GenericDialect {};
        let ast = match Parser::parse_sql(&dialect, sql) {
            Ok(statements) => statements,
            Err(_) => return false,
        };

        match ast.first() {
            Some(Statement::Query(query)) => query.limit_clause.is_some(),
            _ => false,
        }
    }

    /// Wrap a base query to fetch one page of rows
    pub fn paginate(base: &str, limit: u64, offset: u64) -> String {
        format!(
            "SELECT * FROM ({}) AS src LIMIT {} OFFSET {}",
            base, limit, offset
        )
    }
}
