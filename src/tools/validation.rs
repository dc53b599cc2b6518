//! Validate tool call arguments against JSON Schema before execution.

use serde::{Deserialize, Serialize};

use super::arguments::ToolArguments;

/// A single schema violation, keyed by the offending field.
///
/// `field` is empty for violations of the argument object as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Parse raw JSON argument text and validate it against `schema`.
///
/// Empty text is treated as `{}`. Absent optional properties that declare a
/// `default` are filled in. Every violation is reported, not only the first.
pub fn validate_raw_arguments(
    raw: &str,
    schema: &serde_json::Value,
) -> Result<ToolArguments, Vec<FieldError>> {
    let trimmed = raw.trim();
    let mut args = if trimmed.is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str::<serde_json::Value>(trimmed)
            .map_err(|e| vec![FieldError::new("", format!("arguments are not valid JSON: {e}"))])?
    };

    apply_defaults(&mut args, schema);
    validate_arguments(&args, schema)?;
    Ok(ToolArguments::new(args))
}

/// Validate tool arguments against a JSON Schema.
///
/// Performs top-level validation: schema type check, required field presence,
/// property type verification and enum membership.
pub fn validate_arguments(
    args: &serde_json::Value,
    schema: &serde_json::Value,
) -> Result<(), Vec<FieldError>> {
    if let Some(schema_type) = schema.get("type").and_then(|v| v.as_str()) {
        if schema_type == "object" && !args.is_object() {
            return Err(vec![FieldError::new(
                "",
                format!("expected object arguments, got {}", json_type_name(args)),
            )]);
        }
    }

    let Some(obj) = args.as_object() else {
        return Ok(());
    };
    let mut errors = Vec::new();

    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        for name in required.iter().filter_map(|f| f.as_str()) {
            if !obj.contains_key(name) {
                errors.push(FieldError::new(name, "missing required field"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) {
        for (key, value) in obj {
            let Some(prop_schema) = properties.get(key) else {
                continue;
            };
            if let Some(expected_type) = prop_schema.get("type").and_then(|v| v.as_str()) {
                if !value_matches_type(value, expected_type) {
                    errors.push(FieldError::new(
                        key.as_str(),
                        format!(
                            "expected type '{}', got {}",
                            expected_type,
                            json_type_name(value)
                        ),
                    ));
                    continue;
                }
            }
            if let Some(allowed) = prop_schema.get("enum").and_then(|v| v.as_array()) {
                if !allowed.contains(value) {
                    errors.push(FieldError::new(
                        key.as_str(),
                        format!("value {value} is not one of {}", serde_json::Value::from(allowed.clone())),
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn apply_defaults(args: &mut serde_json::Value, schema: &serde_json::Value) {
    let (Some(obj), Some(properties)) = (
        args.as_object_mut(),
        schema.get("properties").and_then(|v| v.as_object()),
    ) else {
        return;
    };
    for (key, prop_schema) in properties {
        if let Some(default) = prop_schema.get("default") {
            obj.entry(key.clone()).or_insert_with(|| default.clone());
        }
    }
}

fn value_matches_type(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
