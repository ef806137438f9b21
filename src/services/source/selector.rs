// Path selector for locating the data inside an API response
//
// Expressions are JSONPath (RFC 9535): `$.data.items`, `$..id`, `$.items[0:2]`,
// `$.items[0,2]`, `$.items[?@.active == true]`. A leading bare name is
// accepted as shorthand, so `data.items` is the same as `$.data.items`.

use serde_json::Value as JsonValue;
use serde_json_path::JsonPath;

use crate::error::{ConvertError, Result};

#[derive(Debug, Clone)]
pub struct Selector {
    expr: String,
    path: JsonPath,
}

impl Selector {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ConvertError::Validation(
                "invalid selector '': empty expression".to_string(),
            ));
        }

        let query = if expr.starts_with('$') {
            expr.to_string()
        } else if expr.starts_with('[') || expr.starts_with('.') {
            format!("${}", expr)
        } else {
            format!("$.{}", expr)
        };
        let path = JsonPath::parse(&query)
            .map_err(|e| ConvertError::Validation(format!("invalid selector '{}': {}", expr, e)))?;

        Ok(Self {
            expr: expr.to_string(),
            path,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// Every node the selector reaches
    pub fn select<'a>(&self, root: &'a JsonValue) -> Vec<&'a JsonValue> {
        self.path.query(root).all()
    }
}
