//! Argument validation against a tool's parameter schema
//!
//! Covers the subset of JSON Schema the built-in tools use: `type`,
//! `required`, `properties`, `items`, `minimum`/`maximum` and
//! `minItems`/`maxItems`. Unknown keywords are ignored.

use serde_json::Value;

/// Check `args` against `schema`, describing the first violation
pub fn validate_arguments(args: &Value, schema: &Value) -> Result<(), String> {
    validate_at("arguments", args, schema)
}

fn validate_at(path: &str, value: &Value, schema: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str)
        && !matches_type(value, expected)
    {
        return Err(format!(
            "{path} must be of type {expected}, got {}",
            type_name(value)
        ));
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
            && number < min
        {
            return Err(format!("{path} must be >= {min}, got {number}"));
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
            && number > max
        {
            return Err(format!("{path} must be <= {max}, got {number}"));
        }
    }

    if let Some(items) = value.as_array() {
        if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
            && (items.len() as u64) < min
        {
            return Err(format!("{path} must have at least {min} item(s), got {}", items.len()));
        }
        if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
            && (items.len() as u64) > max
        {
            return Err(format!("{path} must have at most {max} item(s), got {}", items.len()));
        }
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                validate_at(&format!("{path}[{i}]"), item, item_schema)?;
            }
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if object.get(name).is_none_or(Value::is_null) {
                    return Err(format!("missing required property '{name}'"));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property_schema) in properties {
                if let Some(property) = object.get(name)
                    && !property.is_null()
                {
                    validate_at(name, property, property_schema)?;
                }
            }
        }
    }

    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
