//! Value adaptation between source values and target columns.
//!
//! Structured documents are written as canonical JSON text and loose text
//! bound for a json/jsonb column is promoted to a document. Canonical text is
//! compact with object keys sorted, so the same document always produces the
//! same bytes.

use crate::core::{ColumnKind, SqlValue};
use crate::error::{MigrateError, Result};
use serde_json::{json, Value};

/// Key used to wrap text that is not valid JSON.
pub const RAW_KEY: &str = "raw";

/// Convert a source value into the form written to a column of kind `target`.
///
/// `column` only labels errors.
pub fn normalize(value: SqlValue, target: ColumnKind, column: &str) -> Result<SqlValue> {
    match (value, target) {
        (SqlValue::Null, _) => Ok(SqlValue::Null),
        (SqlValue::Json(doc), _) => Ok(SqlValue::Text(canonical(&doc))),
        (SqlValue::Text(s), ColumnKind::Structured) => Ok(SqlValue::Json(promote_text(&s))),
        (other, ColumnKind::Structured) => to_document(other, column).map(SqlValue::Json),
        (other, _) => Ok(other),
    }
}

/// Compact JSON text with object keys sorted.
pub fn canonical(doc: &Value) -> String {
    // serde_json's default map is ordered by key.
    serde_json::to_string(doc).unwrap_or_else(|_| "null".to_string())
}

/// Parse loose text into a document.
///
/// Empty or whitespace-only text becomes `{}`. Text that does not parse is
/// wrapped as `{"raw": text}`.
pub fn promote_text(s: &str) -> Value {
    if s.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(s).unwrap_or_else(|_| json!({ RAW_KEY: s }))
}

fn to_document(value: SqlValue, column: &str) -> Result<Value> {
    let doc = match value {
        SqlValue::Bool(b) => Value::Bool(b),
        SqlValue::Int(i) => Value::from(i),
        SqlValue::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| adapt_error(column, format!("{} has no JSON representation", f)))?,
        SqlValue::Decimal(d) => serde_json::from_str(&d.to_string())
            .map_err(|e| adapt_error(column, format!("decimal {}: {}", d, e)))?,
        SqlValue::Bytes(_) => {
            return Err(adapt_error(
                column,
                "binary data cannot be stored in a JSON column",
            ))
        }
        other @ (SqlValue::Uuid(_)
        | SqlValue::Timestamp(_)
        | SqlValue::TimestampTz(_)
        | SqlValue::Date(_)
        | SqlValue::Time(_)) => Value::String(other.to_string()),
        // Handled by normalize before we get here.
        SqlValue::Null => Value::Null,
        SqlValue::Text(s) => promote_text(&s),
        SqlValue::Json(doc) => doc,
    };
    Ok(doc)
}

fn adapt_error(column: &str, message: impl Into<String>) -> MigrateError {
    MigrateError::Adapt {
        column: column.to_string(),
        message: message.into(),
    }
}
