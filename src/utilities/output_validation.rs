//! Validation of an agent's final answer against a task's expected output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::OutputSpec;
use crate::utilities::errors::{AgentError, AgentErrorKind};

/// What to do when a final answer does not fit the expected output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputPolicy {
    /// Coerce what can be coerced, log the rest and let it through.
    #[default]
    Permissive,
    /// Reject answers that do not fit.
    Strict,
}

/// A final answer after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOutput {
    pub raw: String,
    /// Parsed JSON when the expected output is a schema and the answer parsed.
    pub json: Option<Value>,
}

/// Validate `answer` against `spec` under `policy`.
pub fn validate_output(
    answer: &str,
    spec: &OutputSpec,
    policy: OutputPolicy,
) -> Result<ValidatedOutput, AgentError> {
    let raw = strip_code_fence(answer.trim()).to_string();

    if raw.is_empty() && policy == OutputPolicy::Strict {
        return Err(AgentError::new(
            AgentErrorKind::OutputValidationFailed,
            "final answer is empty",
        ));
    }

    let schema = match spec {
        OutputSpec::Text(_) => return Ok(ValidatedOutput { raw, json: None }),
        OutputSpec::Schema { schema, .. } => schema,
    };

    let checked = serde_json::from_str::<Value>(&raw)
        .map_err(|e| format!("answer is not valid JSON: {}", e))
        .and_then(|value| check_schema(schema, &value, "$").map(|()| value));

    match (checked, policy) {
        (Ok(value), _) => Ok(ValidatedOutput {
            raw,
            json: Some(value),
        }),
        (Err(reason), OutputPolicy::Strict) => Err(AgentError::new(
            AgentErrorKind::OutputValidationFailed,
            reason,
        )),
        (Err(reason), OutputPolicy::Permissive) => {
            log::warn!("Final answer does not match the expected schema, passing it through: {}", reason);
            Ok(ValidatedOutput { raw, json: None })
        }
    }
}

/// Remove a surrounding ``` fence (with optional language tag).
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the language tag line, if any.
    match body.find('\n') {
        Some(idx) if !body[..idx].trim().contains(' ') => body[idx + 1..].trim(),
        _ => body.trim(),
    }
}

/// Check `value` against the supported schema subset:
/// `type`, `required`, `properties`, `items`.
fn check_schema(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        let ok = match expected {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            _ => true,
        };
        if !ok {
            return Err(format!("{}: expected {}", path, expected));
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if value.get(key).is_none() {
                return Err(format!("{}: missing required property '{}'", path, key));
            }
        }
    }

    if let (Some(props), Some(obj)) = (
        schema.get("properties").and_then(Value::as_object),
        value.as_object(),
    ) {
        for (key, sub) in props {
            if let Some(v) = obj.get(key) {
                check_schema(sub, v, &format!("{}.{}", path, key))?;
            }
        }
    }

    if let (Some(items), Some(arr)) = (schema.get("items"), value.as_array()) {
        for (i, v) in arr.iter().enumerate() {
            check_schema(items, v, &format!("{}[{}]", path, i))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_spec() -> OutputSpec {
        OutputSpec::Schema {
            description: "career strategy".to_string(),
            schema: json!({
                "type": "object",
                "required": ["target_role", "steps"],
                "properties": {
                    "target_role": {"type": "string"},
                    "steps": {"type": "array", "items": {"type": "string"}}
                }
            }),
        }
    }

    #[test]
    fn test_text_spec_trims() {
        let out = validate_output("  hello \n", &OutputSpec::Text("x".into()), OutputPolicy::Strict).unwrap();
        assert_eq!(out.raw, "hello");
        assert!(out.json.is_none());
    }

    #[test]
    fn test_strict_rejects_empty() {
        let err = validate_output("   ", &OutputSpec::Text("x".into()), OutputPolicy::Strict).unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::OutputValidationFailed);
    }

    #[test]
    fn test_permissive_accepts_empty() {
        let out = validate_output("", &OutputSpec::Text("x".into()), OutputPolicy::Permissive).unwrap();
        assert_eq!(out.raw, "");
    }

    #[test]
    fn test_schema_match_in_fence() {
        let answer = "```json\n{\"target_role\": \"Staff SRE\", \"steps\": [\"a\", \"b\"]}\n```";
        let out = validate_output(answer, &schema_spec(), OutputPolicy::Strict).unwrap();
        assert_eq!(out.json.unwrap()["target_role"], "Staff SRE");
    }

    #[test]
    fn test_schema_mismatch_strict_fails() {
        let answer = r#"{"target_role": "Staff SRE", "steps": [1]}"#;
        let err = validate_output(answer, &schema_spec(), OutputPolicy::Strict).unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::OutputValidationFailed);
        assert!(err.message.contains("$.steps[0]"));
    }

    #[test]
    fn test_schema_mismatch_permissive_passes_text() {
        let out = validate_output("not json at all", &schema_spec(), OutputPolicy::Permissive).unwrap();
        assert_eq!(out.raw, "not json at all");
        assert!(out.json.is_none());
    }

    #[test]
    fn test_missing_required_property() {
        let err = validate_output(r#"{"steps": []}"#, &schema_spec(), OutputPolicy::Strict).unwrap_err();
        assert!(err.message.contains("target_role"));
    }
}
