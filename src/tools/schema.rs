//! Strict parsing of tool-call arguments against a declared JSON schema
//!
//! Supports the subset of JSON Schema tool declarations actually use: `type`
//! (single or list), `enum`, `properties`, `required`, `additionalProperties:
//! false` and `items`. Keywords outside that subset are ignored.

use serde_json::Value;
use thiserror::Error;

/// Why an argument payload was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("arguments are not valid JSON: {0}")]
    Malformed(String),

    #[error("arguments must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("field '{field}' must be of type {expected}, got {actual}")]
    WrongType {
        field: String,
        expected: String,
        actual: &'static str,
    },

    #[error("field '{field}' must be one of {allowed}")]
    NotInEnum { field: String, allowed: String },

    #[error("unexpected field: {0}")]
    UnexpectedField(String),
}

/// Parse a raw argument payload and validate it against `schema`
///
/// An empty payload is read as `{}`, so a tool with no required fields can be
/// called without arguments.
pub fn parse_arguments(raw: &str, schema: &Value) -> Result<Value, SchemaError> {
    let raw = raw.trim();
    let value: Value = if raw.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(raw).map_err(|e| SchemaError::Malformed(e.to_string()))?
    };

    if !value.is_object() {
        return Err(SchemaError::NotAnObject(type_name(&value)));
    }

    validate(&value, schema)?;
    Ok(value)
}

/// Validate an already-parsed value against `schema`
pub fn validate(value: &Value, schema: &Value) -> Result<(), SchemaError> {
    check("", value, schema)
}

fn check(path: &str, value: &Value, schema: &Value) -> Result<(), SchemaError> {
    if let Some(declared) = schema.get("type") {
        let types: Vec<&str> = match declared {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(|t| t.as_str()).collect(),
            _ => Vec::new(),
        };
        if !types.is_empty() && !types.iter().any(|t| matches_type(value, t)) {
            return Err(SchemaError::WrongType {
                field: display_path(path),
                expected: types.join(" | "),
                actual: type_name(value),
            });
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array())
        && !allowed.contains(value)
    {
        let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
        return Err(SchemaError::NotInEnum {
            field: display_path(path),
            allowed: allowed.join(", "),
        });
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for name in required.iter().filter_map(|r| r.as_str()) {
                if !object.contains_key(name) {
                    return Err(SchemaError::MissingField(join_path(path, name)));
                }
            }
        }

        let properties = schema.get("properties").and_then(|p| p.as_object());
        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

        for (key, field) in object {
            match properties.and_then(|p| p.get(key)) {
                Some(field_schema) => check(&join_path(path, key), field, field_schema)?,
                None if closed => return Err(SchemaError::UnexpectedField(join_path(path, key))),
                None => {}
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (i, item) in array.iter().enumerate() {
            check(&format!("{}[{}]", display_path(path), i), item, items)?;
        }
    }

    Ok(())
}

fn matches_type(value: &Value, ty: &str) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type keywords are not enforced
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

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "arguments".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": { "type": "string", "description": "The city name" }
            },
            "required": ["location"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_arguments() {
        let value = parse_arguments(r#"{"location": "Paris"}"#, &weather_schema()).unwrap();
        assert_eq!(value["location"], "Paris");
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = parse_arguments("{'location': 'Paris'}", &weather_schema());
        assert!(matches!(result, Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn test_expression_payload_rejected() {
        // Code-like payloads are data errors, never evaluated
        let result = parse_arguments("__import__('os').system('ls')", &weather_schema());
        assert!(matches!(result, Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn test_non_object_rejected() {
        let result = parse_arguments(r#"["Paris"]"#, &weather_schema());
        assert_eq!(result, Err(SchemaError::NotAnObject("array")));
    }

    #[test]
    fn test_missing_required_field() {
        let result = parse_arguments("{}", &weather_schema());
        assert_eq!(result, Err(SchemaError::MissingField("location".to_string())));
    }

    #[test]
    fn test_empty_payload_is_empty_object() {
        let result = parse_arguments("  ", &weather_schema());
        assert_eq!(result, Err(SchemaError::MissingField("location".to_string())));

        let open = json!({"type": "object", "properties": {}});
        assert_eq!(parse_arguments("", &open).unwrap(), json!({}));
    }

    #[test]
    fn test_wrong_type() {
        let err = parse_arguments(r#"{"location": 42}"#, &weather_schema()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::WrongType {
                field: "location".to_string(),
                expected: "string".to_string(),
                actual: "number",
            }
        );
        assert!(err.to_string().contains("must be of type string"));
    }

    #[test]
    fn test_additional_properties_rejected() {
        let result = parse_arguments(r#"{"location": "Paris", "units": "C"}"#, &weather_schema());
        assert_eq!(result, Err(SchemaError::UnexpectedField("units".to_string())));
    }

    #[test]
    fn test_additional_properties_allowed_by_default() {
        let schema = json!({
            "type": "object",
            "properties": { "location": { "type": "string" } }
        });
        assert!(parse_arguments(r#"{"location": "Paris", "units": "C"}"#, &schema).is_ok());
    }

    #[test]
    fn test_enum_and_integer() {
        let schema = json!({
            "type": "object",
            "properties": {
                "units": { "type": "string", "enum": ["metric", "imperial"] },
                "days": { "type": "integer" }
            }
        });

        assert!(parse_arguments(r#"{"units": "metric", "days": 3}"#, &schema).is_ok());
        assert!(matches!(
            parse_arguments(r#"{"units": "kelvin"}"#, &schema),
            Err(SchemaError::NotInEnum { .. })
        ));
        assert!(matches!(
            parse_arguments(r#"{"days": 2.5}"#, &schema),
            Err(SchemaError::WrongType { .. })
        ));
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let schema = json!({
            "type": "object",
            "properties": {
                "cities": { "type": "array", "items": { "type": "string" } },
                "options": {
                    "type": "object",
                    "properties": { "hourly": { "type": "boolean" } },
                    "required": ["hourly"]
                }
            }
        });

        assert!(parse_arguments(r#"{"cities": ["Paris"], "options": {"hourly": true}}"#, &schema).is_ok());
        assert_eq!(
            parse_arguments(r#"{"options": {}}"#, &schema),
            Err(SchemaError::MissingField("options.hourly".to_string()))
        );
        assert!(matches!(
            parse_arguments(r#"{"cities": ["Paris", 7]}"#, &schema),
            Err(SchemaError::WrongType { ref field, .. }) if field == "cities[1]"
        ));
    }

    #[test]
    fn test_type_union() {
        let schema = json!({
            "type": "object",
            "properties": { "note": { "type": ["string", "null"] } }
        });
        assert!(parse_arguments(r#"{"note": null}"#, &schema).is_ok());
        assert!(parse_arguments(r#"{"note": "x"}"#, &schema).is_ok());
        assert!(parse_arguments(r#"{"note": 1}"#, &schema).is_err());
    }
}
