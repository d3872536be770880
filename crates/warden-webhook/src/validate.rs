//! Payload validation against a [`WebhookSpec`]'s field schema (§4.K):
//! required/type/enum/maxLength/additionalProperties/property-count, all
//! evaluated before anything touches the agent.

use warden_schedule::types::{FieldSpec, FieldType, WebhookSpec};

const DEFAULT_MAX_LENGTH: usize = 500;
const MAX_PROPERTIES: usize = 20;

fn type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::String(_) => "string",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Null => "null",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn matches_type(value: &serde_json::Value, expected: FieldType) -> bool {
    match expected {
        FieldType::String => value.is_string(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Number => value.is_number(),
    }
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn check_field(name: &str, spec: &FieldSpec, value: &serde_json::Value, errors: &mut Vec<String>) {
    if !matches_type(value, spec.field_type) {
        errors.push(format!(
            "field {name:?} has type {}, expected {:?}",
            type_name(value),
            spec.field_type
        ));
        return;
    }

    let rendered = stringify(value);

    if matches!(spec.field_type, FieldType::String) {
        let max = spec.max_length.unwrap_or(DEFAULT_MAX_LENGTH);
        if rendered.chars().count() > max {
            errors.push(format!("field {name:?} exceeds max length {max}"));
        }
    }

    if let Some(allowed) = &spec.enum_values {
        if !allowed.iter().any(|v| v == &rendered) {
            errors.push(format!("field {name:?} is not one of the allowed values"));
        }
    }
}

/// Validate `payload` against `spec.fields`. On success, returns the
/// fields actually present in the payload as ordered `(name, value)`
/// pairs (sorted by name for determinism) ready to render into a
/// prompt. On failure, returns every violation found — callers render
/// them joined for the 400 body.
pub fn validate_payload(
    spec: &WebhookSpec,
    payload: &serde_json::Value,
) -> Result<Vec<(String, String)>, Vec<String>> {
    let mut errors = Vec::new();

    let Some(object) = payload.as_object() else {
        return Err(vec!["payload must be a JSON object".to_string()]);
    };

    if object.len() > MAX_PROPERTIES {
        errors.push(format!("too many properties (max {MAX_PROPERTIES})"));
    }

    for key in object.keys() {
        if !spec.fields.contains_key(key) {
            errors.push(format!("unexpected field {key:?} (additionalProperties)"));
        }
    }

    let mut present = Vec::new();
    for (name, field_spec) in &spec.fields {
        match object.get(name) {
            Some(value) => {
                check_field(name, field_spec, value, &mut errors);
                present.push((name.clone(), stringify(value)));
            }
            None if field_spec.required => {
                errors.push(format!("missing required field {name:?}"));
            }
            None => {}
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    present.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use warden_core::policy::ForkPolicy;

    fn spec(fields: HashMap<String, FieldSpec>) -> WebhookSpec {
        WebhookSpec {
            id: "ci".to_string(),
            message: "Check {repo}.".to_string(),
            fields,
            isolated: false,
            model: None,
            thinking: true,
            policy: ForkPolicy::default(),
        }
    }

    fn string_field(required: bool) -> FieldSpec {
        FieldSpec {
            field_type: FieldType::String,
            required,
            max_length: None,
            enum_values: None,
        }
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let spec = spec(HashMap::from([("repo".to_string(), string_field(true))]));
        let errors = validate_payload(&spec, &serde_json::json!({})).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("missing required field")));
    }

    #[test]
    fn unexpected_field_is_rejected() {
        let spec = spec(HashMap::from([("repo".to_string(), string_field(true))]));
        let errors = validate_payload(&spec, &serde_json::json!({"repo": "x", "extra": "y"})).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("unexpected field")));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let spec = spec(HashMap::from([("repo".to_string(), string_field(true))]));
        let errors = validate_payload(&spec, &serde_json::json!({"repo": 5})).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("has type")));
    }

    #[test]
    fn string_exceeding_default_max_length_is_rejected() {
        let spec = spec(HashMap::from([("repo".to_string(), string_field(true))]));
        let long = "a".repeat(501);
        let errors = validate_payload(&spec, &serde_json::json!({"repo": long})).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("exceeds max length 500")));
    }

    #[test]
    fn enum_mismatch_is_rejected() {
        let mut field = string_field(true);
        field.enum_values = Some(vec!["success".to_string(), "failure".to_string()]);
        let spec = spec(HashMap::from([("status".to_string(), field)]));
        let errors = validate_payload(&spec, &serde_json::json!({"status": "pending"})).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("not one of the allowed values")));
    }

    #[test]
    fn too_many_properties_is_rejected() {
        let mut fields = HashMap::new();
        let mut payload = serde_json::Map::new();
        for i in 0..21 {
            let name = format!("f{i}");
            fields.insert(name.clone(), string_field(false));
            payload.insert(name, serde_json::json!("x"));
        }
        let spec = spec(fields);
        let errors = validate_payload(&spec, &serde_json::Value::Object(payload)).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("too many properties")));
    }

    #[test]
    fn valid_payload_returns_sorted_present_fields() {
        let spec = spec(HashMap::from([
            ("repo".to_string(), string_field(true)),
            ("branch".to_string(), string_field(false)),
        ]));
        let fields = validate_payload(&spec, &serde_json::json!({"repo": "test"})).unwrap();
        assert_eq!(fields, vec![("repo".to_string(), "test".to_string())]);
    }
}
