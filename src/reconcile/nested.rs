//! String-encoded sub-structures
//!
//! The client stores several nested structures (call logs, link previews,
//! meeting details) as JSON text inside the serialized object.

use serde_json::{Map, Value};

use super::errors::{ReconcileError, ReconcileResult};

/// Decode `value` if it is JSON text; other values are returned unchanged.
///
/// Only strings that start with `{` or `[` are treated as JSON.
pub fn decode_nested(field: &str, value: &Value) -> ReconcileResult<Value> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(trimmed).map_err(|e| ReconcileError::InvalidNestedJson {
                    field: field.to_string(),
                    reason: e.to_string(),
                })
            } else {
                Ok(value.clone())
            }
        }
        other => Ok(other.clone()),
    }
}

/// A property bag: an object, or JSON text holding one. Anything else is empty.
pub fn decode_object(field: &str, value: Option<&Value>) -> ReconcileResult<Map<String, Value>> {
    match value.map(|v| decode_nested(field, v)).transpose()? {
        Some(Value::Object(map)) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Whether a decoded value carries any content.
pub fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
