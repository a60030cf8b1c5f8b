//! Shared helpers for tool inputs and upstream payloads.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Input for tools that take no arguments
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// Replace every `{"value": "<decimal>"}` wrapper with its inner string.
///
/// The trading API encodes prices, sizes and balances this way.
pub fn flatten_decimals(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(inner)) = map.get("value") {
                    return Value::String(inner.clone());
                }
            }
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, flatten_decimals(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(flatten_decimals).collect()),
        other => other,
    }
}

/// Trimmed, non-empty string argument
pub fn non_empty(name: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(vec![format!(
            "parameter `{}` must not be empty",
            name
        )]));
    }
    Ok(trimmed.to_string())
}

/// Take an array field out of an upstream object, treating absence as empty
pub fn take_array(value: &mut Value, field: &str) -> Vec<Value> {
    match value.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Object view of an upstream payload, wrapping non-objects under `data`
pub fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    }
}
