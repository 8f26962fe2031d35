//! Validates payload objects against a resource's field declarations.

use serde_json::{Map, Value};

use crate::errors::Violation;
use crate::models::resource::ResourceDef;

/// Check `payload` against every declared field of `resource`.
///
/// A required field that is absent or null yields a `required` violation
/// and no further checks on that field. A present field whose runtime type
/// does not match the declaration yields a `wrong_type` violation.
/// Undeclared extra fields pass through untouched.
pub fn validate_payload(resource: &ResourceDef, payload: &Map<String, Value>) -> Vec<Violation> {
    let mut violations = Vec::new();

    for field in &resource.fields {
        match payload.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    violations.push(Violation::required(&field.name));
                }
            }
            Some(value) => {
                if !field.field_type.matches(value) {
                    violations.push(Violation::wrong_type(&field.name, field.field_type.as_str()));
                }
            }
        }
    }

    violations
}

/// Shallow-merge `patch` over `current`. Updates are validated against the
/// merged record, not the partial diff, so a patch cannot sneak a required
/// field away while another keeps the record valid.
pub fn merge_payload(current: &Value, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = current.as_object().cloned().unwrap_or_default();
    for (k, v) in patch {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resource::ResourceDef;
    use serde_json::json;

    fn resource() -> ResourceDef {
        serde_json::from_value(json!({
            "name": "record",
            "fields": [
                {"name": "title", "type": "string", "required": true},
                {"name": "count", "type": "number"},
                {"name": "done", "type": "boolean"},
                {"name": "metadata", "type": "object"}
            ]
        }))
        .unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_missing_required_field_is_reported_by_name() {
        let violations = validate_payload(&resource(), &obj(json!({"count": 2})));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "title");
        assert_eq!(violations[0].code, "required");
    }

    #[test]
    fn test_null_counts_as_missing() {
        let violations = validate_payload(&resource(), &obj(json!({"title": null})));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, "required");
    }

    #[test]
    fn test_wrong_typed_optional_field_is_rejected() {
        let violations =
            validate_payload(&resource(), &obj(json!({"title": "x", "count": "three"})));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "count");
        assert_eq!(violations[0].code, "wrong_type");
    }

    #[test]
    fn test_array_is_not_an_object() {
        let violations =
            validate_payload(&resource(), &obj(json!({"title": "x", "metadata": [1]})));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "metadata");
    }

    #[test]
    fn test_valid_payload_passes_and_extras_are_ignored() {
        let violations = validate_payload(
            &resource(),
            &obj(json!({
                "title": "x",
                "count": 3,
                "done": false,
                "metadata": {"a": 1},
                "extra": "untouched"
            })),
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_update_validates_merged_record() {
        let current = json!({"title": "x", "count": 1});
        // Patch alone is missing the required title, but the merge keeps it.
        let merged = merge_payload(&current, &obj(json!({"count": 2})));
        assert!(validate_payload(&resource(), &merged).is_empty());
        assert_eq!(merged["title"], "x");
        assert_eq!(merged["count"], 2);

        // Patching the required field to null must fail on the merged view.
        let merged = merge_payload(&current, &obj(json!({"title": null})));
        let violations = validate_payload(&resource(), &merged);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "title");
    }
}
