//! Field discovery from a form schema
//!
//! Derives the initial field-identifier list from a JSON-Schema-like document.
//! Unresolvable schemas are not fatal: they yield an empty list and a warning,
//! and tracking continues with zero known fields.

use serde_json::Value;
use std::collections::BTreeSet;

/// Collect top-level field names from a schema document.
///
/// Understood shapes:
/// - `{"properties": {...}}`
/// - `allOf` / `anyOf` / `oneOf` branches (merged)
/// - a wrapper object `{"schema": {...}}` around any of the above
pub fn field_names(schema: &Value) -> Vec<String> {
    let mut names = BTreeSet::new();
    if !collect(schema, &mut names) {
        tracing::warn!("Could not derive field names from schema, tracking with no fields");
    }
    names.into_iter().collect()
}

/// Parse `json` and derive field names; invalid JSON degrades like any other
/// unresolvable schema
pub fn field_names_from_str(json: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(json) {
        Ok(schema) => field_names(&schema),
        Err(e) => {
            tracing::warn!(error = %e, "Schema is not valid JSON, tracking with no fields");
            Vec::new()
        }
    }
}

/// Returns whether any recognizable shape was found
fn collect(schema: &Value, names: &mut BTreeSet<String>) -> bool {
    let Some(object) = schema.as_object() else {
        return false;
    };

    let mut resolved = false;

    if let Some(properties) = object.get("properties").and_then(Value::as_object) {
        names.extend(properties.keys().cloned());
        resolved = true;
    }

    for combinator in ["allOf", "anyOf", "oneOf"] {
        if let Some(branches) = object.get(combinator).and_then(Value::as_array) {
            for branch in branches {
                resolved |= collect(branch, names);
            }
        }
    }

    if !resolved {
        if let Some(inner) = object.get("schema") {
            resolved = collect(inner, names);
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_properties() {
        let schema = json!({
            "type": "object",
            "properties": {
                "email": {"type": "string"},
                "name": {"type": "string"},
                "cardNumber": {"type": "string"}
            }
        });
        assert_eq!(field_names(&schema), vec!["cardNumber", "email", "name"]);
    }

    #[test]
    fn test_combinators_merge() {
        let schema = json!({
            "allOf": [
                {"properties": {"email": {}}},
                {"anyOf": [{"properties": {"phone": {}}}, {"properties": {"email": {}}}]}
            ]
        });
        assert_eq!(field_names(&schema), vec!["email", "phone"]);
    }

    #[test]
    fn test_wrapped_schema() {
        let schema = json!({"schema": {"properties": {"experience": {}}}});
        assert_eq!(field_names(&schema), vec!["experience"]);
    }

    #[test]
    fn test_unresolvable_schema_is_empty() {
        assert!(field_names(&json!("string schema")).is_empty());
        assert!(field_names(&json!({"type": "object"})).is_empty());
        assert!(field_names_from_str("{oops").is_empty());
    }
}
