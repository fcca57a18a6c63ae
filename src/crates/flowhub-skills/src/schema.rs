//! JSON Schema validation helpers

use jsonschema::JSONSchema;
use serde_json::Value;

/// Validate `instance` against `schema`
///
/// Returns the list of validation error messages, empty on success.
/// A schema that itself fails to compile yields a single message; a
/// malformed schema must not make the instance pass.
pub fn validation_errors(schema: &Value, instance: &Value) -> Vec<String> {
    // Trivial schemas accept everything without compiling
    if schema.is_null() || schema == &Value::Bool(true) {
        return Vec::new();
    }
    if let Value::Object(map) = schema {
        if map.is_empty() {
            return Vec::new();
        }
    }

    let compiled = match JSONSchema::compile(schema) {
        Ok(compiled) => compiled,
        Err(e) => return vec![format!("invalid schema: {}", e)],
    };

    // Collect messages while the compiled schema is still alive
    let result = match compiled.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect(),
    };
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_instance() {
        let schema = json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        });
        assert!(validation_errors(&schema, &json!({"city": "Shanghai"})).is_empty());
    }

    #[test]
    fn test_missing_required_field() {
        let schema = json!({
            "type": "object",
            "required": ["city"]
        });
        let errors = validation_errors(&schema, &json!({}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("city"));
    }

    #[test]
    fn test_empty_schema_accepts_anything() {
        assert!(validation_errors(&json!({}), &json!([1, 2])).is_empty());
        assert!(validation_errors(&Value::Null, &json!("x")).is_empty());
    }
}
