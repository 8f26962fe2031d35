//! Declared resource schema for a service's generated CRUD surface.
//!
//! Resource declarations arrive already normalized from the
//! schema-inference side; this module only models them as closed, tagged
//! data. The validator and resolver operate purely on these declarations,
//! never on reflection over payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Full resource specification attached to a service at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceDef>,
}

/// One declared entity type, e.g. `record` or `blog post`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Closed set of payload field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
}

impl FieldType {
    /// Whether a JSON value matches this declared type. `object` means a
    /// non-null, non-array JSON object; `number` any finite numeric.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.as_f64().is_some_and(f64::is_finite),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_matches() {
        assert!(FieldType::String.matches(&json!("x")));
        assert!(!FieldType::String.matches(&json!(1)));
        assert!(FieldType::Number.matches(&json!(1.5)));
        assert!(FieldType::Number.matches(&json!(-3)));
        assert!(!FieldType::Number.matches(&json!("1")));
        assert!(FieldType::Boolean.matches(&json!(true)));
        assert!(!FieldType::Boolean.matches(&json!(0)));
        assert!(FieldType::Object.matches(&json!({"a": 1})));
        assert!(!FieldType::Object.matches(&json!([1, 2])));
        assert!(!FieldType::Object.matches(&json!(null)));
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: ResourceSpec = serde_json::from_value(json!({
            "resources": [
                {"name": "record", "fields": [
                    {"name": "title", "type": "string", "required": true},
                    {"name": "metadata", "type": "object"}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(spec.resources.len(), 1);
        let fields = &spec.resources[0].fields;
        assert!(fields[0].required);
        assert!(!fields[1].required);
        assert_eq!(fields[1].field_type, FieldType::Object);
    }
}
