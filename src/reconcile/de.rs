//! Lenient field deserializers
//!
//! Stored client data is loosely typed: the same field holds a string in
//! one release and a number in the next. These helpers accept whatever is
//! there and never fail, so one odd field cannot drop an entity.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Strings as-is; numbers and booleans in their text form; anything else `None`.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_of(&Value::deserialize(deserializer)?))
}

pub fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Booleans, plus `"true"`/`"false"` and 0/1.
pub fn opt_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    })
}

/// Epoch milliseconds from a number or a numeric string.
pub fn opt_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(millis_of(&Value::deserialize(deserializer)?))
}

pub fn millis_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

/// Arrays as-is; a single value becomes a one-element list; null is empty.
pub fn list<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Lenient {
        #[serde(deserialize_with = "opt_string")]
        text: Option<String>,
        #[serde(deserialize_with = "opt_bool")]
        flag: Option<bool>,
        #[serde(deserialize_with = "opt_millis")]
        millis: Option<i64>,
        #[serde(deserialize_with = "list")]
        items: Vec<Value>,
    }

    fn lenient(value: Value) -> Lenient {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_fields_default() {
        let p = lenient(json!({}));
        assert_eq!(p.text, None);
        assert_eq!(p.flag, None);
        assert!(p.items.is_empty());
    }

    #[test]
    fn test_string_accepts_numbers() {
        assert_eq!(lenient(json!({"text": 12})).text.as_deref(), Some("12"));
        assert_eq!(lenient(json!({"text": {"a": 1}})).text, None);
    }

    #[test]
    fn test_bool_variants() {
        assert_eq!(lenient(json!({"flag": "TRUE"})).flag, Some(true));
        assert_eq!(lenient(json!({"flag": 0})).flag, Some(false));
        assert_eq!(lenient(json!({"flag": "maybe"})).flag, None);
    }

    #[test]
    fn test_millis_variants() {
        assert_eq!(lenient(json!({"millis": "1620000000000"})).millis, Some(1620000000000));
        assert_eq!(lenient(json!({"millis": 1.5e12})).millis, Some(1500000000000));
        assert_eq!(lenient(json!({"millis": "soon"})).millis, None);
    }

    #[test]
    fn test_list_variants() {
        assert_eq!(lenient(json!({"items": [1, 2]})).items.len(), 2);
        assert_eq!(lenient(json!({"items": "x"})).items, vec![json!("x")]);
        assert!(lenient(json!({"items": null})).items.is_empty());
    }
}
