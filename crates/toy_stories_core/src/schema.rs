//! crates/toy_stories_core/src/schema.rs
//!
//! The JSON response schemas sent to the AI vendor, and the check that a
//! returned document actually honours one.

use serde_json::Value;

/// An OpenAPI-style object schema (`type`, `properties`, `items`, `required`),
/// the subset the Gemini `responseSchema` field accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema(Value);

impl ResponseSchema {
    pub fn new(schema: Value) -> Self {
        Self(schema)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Checks required fields and primitive types, recursively.
    /// The error names the JSON path of the first mismatch.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        validate_node(&self.0, value, "$")
    }
}

fn validate_node(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(kind) = schema.get("type").and_then(Value::as_str) else {
        return Ok(());
    };

    match kind.to_ascii_lowercase().as_str() {
        "object" => {
            let object = value
                .as_object()
                .ok_or_else(|| format!("{path}: expected an object"))?;

            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for field in required.iter().filter_map(Value::as_str) {
                    if !object.contains_key(field) {
                        return Err(format!("{path}: missing required field '{field}'"));
                    }
                }
            }

            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (name, property_schema) in properties {
                    if let Some(child) = object.get(name) {
                        validate_node(property_schema, child, &format!("{path}.{name}"))?;
                    }
                }
            }
            Ok(())
        }
        "array" => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("{path}: expected an array"))?;
            if let Some(item_schema) = schema.get("items") {
                for (index, item) in items.iter().enumerate() {
                    validate_node(item_schema, item, &format!("{path}[{index}]"))?;
                }
            }
            Ok(())
        }
        "string" if !value.is_string() => Err(format!("{path}: expected a string")),
        "number" if !value.is_number() => Err(format!("{path}: expected a number")),
        "integer" if !(value.is_i64() || value.is_u64()) => {
            Err(format!("{path}: expected an integer"))
        }
        "boolean" if !value.is_boolean() => Err(format!("{path}: expected a boolean")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn toy_schema() -> ResponseSchema {
        ResponseSchema::new(json!({
            "type": "object",
            "properties": {
                "Item": { "type": "string" },
                "Name": { "type": "string" },
                "Tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["Item", "Name"]
        }))
    }

    #[test]
    fn accepts_matching_document() {
        let doc = json!({ "Item": "Dinosaur", "Name": "Azul", "Tags": ["plush"] });
        assert!(toy_schema().validate(&doc).is_ok());
    }

    #[test]
    fn reports_missing_required_field() {
        let err = toy_schema().validate(&json!({ "Item": "Dinosaur" })).unwrap_err();
        assert_eq!(err, "$: missing required field 'Name'");
    }

    #[test]
    fn reports_wrong_nested_type_with_path() {
        let doc = json!({ "Item": "Dinosaur", "Name": "Azul", "Tags": ["plush", 4] });
        let err = toy_schema().validate(&doc).unwrap_err();
        assert_eq!(err, "$.Tags[1]: expected a string");
    }

    #[test]
    fn uppercase_type_names_are_understood() {
        let schema = ResponseSchema::new(json!({ "type": "OBJECT", "required": ["a"] }));
        assert!(schema.validate(&json!({})).is_err());
    }
}
