//! Shallow argument validation against JSON-Schema-shaped contracts.
//!
//! Only two checks run: every `required` field must be present, and each
//! provided field declared under `properties` must match its primitive
//! `type`. Nested object and array schemas are not inspected.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("field `{field}` must be of type {expected}")]
    WrongType { field: String, expected: String },
}

/// Checks that a schema describes a mapping of named arguments.
pub fn ensure_object_schema(schema: &Value) -> Result<(), String> {
    let Some(fields) = schema.as_object() else {
        return Err("schema must be a JSON object".to_string());
    };

    match fields.get("type").and_then(Value::as_str) {
        Some("object") => {}
        Some(other) => return Err(format!("schema type must be `object`, found `{other}`")),
        None => return Err("schema must declare `type = \"object\"`".to_string()),
    }

    if let Some(properties) = fields.get("properties") {
        if !properties.is_object() {
            return Err("schema `properties` must be an object".to_string());
        }
    }
    if let Some(required) = fields.get("required") {
        let all_strings =
            required.as_array().is_some_and(|names| names.iter().all(Value::is_string));
        if !all_strings {
            return Err("schema `required` must be a list of field names".to_string());
        }
    }

    Ok(())
}

pub fn validate_arguments(
    schema: &Value,
    arguments: &Map<String, Value>,
) -> Result<(), SchemaViolation> {
    let required = schema.get("required").and_then(Value::as_array);
    for name in required.into_iter().flatten().filter_map(Value::as_str) {
        if !arguments.contains_key(name) {
            return Err(SchemaViolation::MissingField(name.to_string()));
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (field, value) in arguments {
        let Some(declared) = properties.get(field).and_then(|property| property.get("type")) else {
            continue;
        };

        let accepted = match declared {
            Value::String(expected) => matches_type(expected, value),
            Value::Array(options) => {
                options.iter().filter_map(Value::as_str).any(|expected| matches_type(expected, value))
            }
            _ => true,
        };

        if !accepted {
            return Err(SchemaViolation::WrongType {
                field: field.clone(),
                expected: declared.to_string(),
            });
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type names are not enforced.
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{ensure_object_schema, validate_arguments, SchemaViolation};

    fn weather_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                "days": { "type": "integer" },
                "units": { "type": ["string", "null"] },
                "filters": { "type": "object", "properties": { "rain": { "type": "boolean" } } }
            },
            "required": ["city"]
        })
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn missing_required_field_is_reported() {
        let result = validate_arguments(&weather_schema(), &Map::new());
        assert_eq!(result, Err(SchemaViolation::MissingField("city".to_string())));
    }

    #[test]
    fn primitive_types_are_checked() {
        let schema = weather_schema();

        assert!(validate_arguments(&schema, &args(json!({ "city": "Oslo", "days": 3 }))).is_ok());
        assert!(matches!(
            validate_arguments(&schema, &args(json!({ "city": 42 }))),
            Err(SchemaViolation::WrongType { ref field, .. }) if field == "city"
        ));
        assert!(validate_arguments(&schema, &args(json!({ "city": "Oslo", "days": 2.5 }))).is_err());
    }

    #[test]
    fn union_types_accept_any_listed_type() {
        let schema = weather_schema();
        assert!(validate_arguments(&schema, &args(json!({ "city": "Oslo", "units": null }))).is_ok());
        assert!(validate_arguments(&schema, &args(json!({ "city": "Oslo", "units": 1 }))).is_err());
    }

    #[test]
    fn nested_schemas_are_not_walked() {
        let schema = weather_schema();
        let arguments = args(json!({ "city": "Oslo", "filters": { "rain": "definitely" } }));
        assert!(validate_arguments(&schema, &arguments).is_ok());
    }

    #[test]
    fn undeclared_fields_pass_through() {
        let schema = weather_schema();
        assert!(validate_arguments(&schema, &args(json!({ "city": "Oslo", "extra": [1] }))).is_ok());
    }

    #[test]
    fn non_object_schemas_are_rejected() {
        assert!(ensure_object_schema(&weather_schema()).is_ok());
        assert!(ensure_object_schema(&json!({ "type": "string" })).is_err());
        assert!(ensure_object_schema(&json!({ "properties": {} })).is_err());
        assert!(ensure_object_schema(&json!({ "type": "object", "required": "city" })).is_err());
    }
}
