//! Tool parameter declarations and argument validation
//!
//! Validation collects every violation before failing so the LLM can fix all
//! of its arguments in one round trip.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// JSON type a parameter must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared tool parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            required: true,
            default: None,
        }
    }

    /// Optional parameter filled with `default` when absent
    pub fn optional(name: &'static str, ty: ParamType, default: Value) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: Some(default),
        }
    }
}

/// Check `arguments` against `params` and fill in defaults.
///
/// `null` counts as absent. Parameters the tool does not declare are rejected.
pub fn validate(params: &[ParamSpec], arguments: Value) -> Result<Map<String, Value>> {
    let mut args = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(Error::Validation(vec![format!(
                "arguments must be an object, got {}",
                json_type_name(&other)
            )]))
        }
    };
    args.retain(|_, v| !v.is_null());

    let mut violations = Vec::new();

    for key in args.keys() {
        if !params.iter().any(|p| p.name == key.as_str()) {
            violations.push(format!("unexpected parameter `{}`", key));
        }
    }

    for param in params {
        match args.get(param.name) {
            Some(value) if !param.ty.matches(value) => violations.push(format!(
                "parameter `{}` must be {}, got {}",
                param.name,
                param.ty.name(),
                json_type_name(value)
            )),
            Some(_) => {}
            None if param.required => {
                violations.push(format!("missing required parameter `{}`", param.name))
            }
            None => {
                if let Some(default) = &param.default {
                    args.insert(param.name.to_string(), default.clone());
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(args)
    } else {
        Err(Error::Validation(violations))
    }
}
