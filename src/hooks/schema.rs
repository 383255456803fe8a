//! Minimum viable access token schema.
//!
//! Any claims map leaving this crate, hook-customized or not, must pass
//! `validate`. Unknown claims are allowed so hooks can add their own.

use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::error;

pub const MINIMUM_VIABLE_TOKEN_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "properties": {
    "aud": {
      "type": "string"
    },
    "exp": {
      "type": "integer"
    },
    "jti": {
      "type": "string"
    },
    "iat": {
      "type": "integer"
    },
    "iss": {
      "type": "string"
    },
    "nbf": {
      "type": "integer"
    },
    "sub": {
      "type": "string"
    },
    "email": {
      "type": "string"
    },
    "phone": {
      "type": "string"
    },
    "app_metadata": {
      "type": "object",
      "additionalProperties": true
    },
    "user_metadata": {
      "type": "object",
      "additionalProperties": true
    },
    "role": {
      "type": "string"
    },
    "aal": {
      "type": "string"
    },
    "amr": {
      "type": "array",
      "items": {
        "type": "object"
      }
    },
    "session_id": {
      "type": "string"
    }
  },
  "required": ["aud", "exp", "iat", "sub", "email", "phone", "role", "aal"]
}"##;

/// Claims required in every minted access token.
pub const REQUIRED_CLAIMS: [&str; 8] = ["aud", "exp", "iat", "sub", "email", "phone", "role", "aal"];

/// First schema violation found in a claims value.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid claim at `{path}`: expected {expected}, found {actual}")]
pub struct SchemaViolation {
    /// JSON pointer of the failing field (`""` for the root).
    pub path: String,
    pub expected: String,
    pub actual: String,
}

struct CompiledSchema {
    document: Value,
    validator: JSONSchema,
}

fn compiled() -> Result<&'static CompiledSchema, SchemaViolation> {
    static SCHEMA: OnceLock<Result<CompiledSchema, String>> = OnceLock::new();

    SCHEMA
        .get_or_init(|| {
            let document: Value =
                serde_json::from_str(MINIMUM_VIABLE_TOKEN_SCHEMA).map_err(|e| e.to_string())?;
            let validator = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&document)
                .map_err(|e| e.to_string())?;
            Ok(CompiledSchema {
                document,
                validator,
            })
        })
        .as_ref()
        .map_err(|err| {
            error!("minimum viable token schema failed to compile: {err}");
            SchemaViolation {
                path: String::new(),
                expected: "compiled token schema".to_string(),
                actual: err.clone(),
            }
        })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn declared_type(document: &Value, property: &str) -> String {
    document
        .get("properties")
        .and_then(|p| p.get(property))
        .and_then(|p| p.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("any")
        .to_string()
}

/// Validate a claims value against the minimum viable token schema.
///
/// # Errors
/// Returns the violation with the lowest JSON pointer, so repeated calls on the
/// same value always report the same field.
pub fn validate(value: &Value) -> Result<(), SchemaViolation> {
    let schema = compiled()?;

    let Err(errors) = schema.validator.validate(value) else {
        return Ok(());
    };

    let mut violations: Vec<SchemaViolation> = errors
        .map(|err| {
            let instance_path = err.instance_path.to_string();
            match &err.kind {
                ValidationErrorKind::Required { property } => {
                    let property = property.as_str().unwrap_or_default();
                    SchemaViolation {
                        path: format!("{instance_path}/{property}"),
                        expected: declared_type(&schema.document, property),
                        actual: "missing".to_string(),
                    }
                }
                ValidationErrorKind::Type { kind } => SchemaViolation {
                    path: instance_path,
                    expected: match kind {
                        TypeKind::Single(ty) => ty.to_string(),
                        TypeKind::Multiple(_) => "one of several types".to_string(),
                    },
                    actual: kind_of(&err.instance).to_string(),
                },
                other => SchemaViolation {
                    path: instance_path,
                    expected: format!("{other:?}"),
                    actual: kind_of(&err.instance).to_string(),
                },
            }
        })
        .collect();

    violations.sort_by(|a, b| a.path.cmp(&b.path));

    match violations.into_iter().next() {
        Some(violation) => Err(violation),
        None => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_claims() -> Value {
        json!({
            "aud": "authenticated",
            "exp": 1_900_000_000,
            "iat": 1_800_000_000,
            "sub": "11111111-1111-1111-1111-111111111111",
            "email": "user@example.com",
            "phone": "",
            "role": "authenticated",
            "aal": "aal1",
            "app_metadata": {"provider": "email"},
            "user_metadata": {},
            "amr": [{"method": "password", "timestamp": 1_800_000_000}],
            "session_id": "33333333-3333-3333-3333-333333333333"
        })
    }

    #[test]
    fn schema_document_parses() {
        let document: Value = serde_json::from_str(MINIMUM_VIABLE_TOKEN_SCHEMA).unwrap();
        let required: Vec<&str> = document["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, REQUIRED_CLAIMS);
    }

    #[test]
    fn accepts_valid_claims() {
        assert_eq!(validate(&valid_claims()), Ok(()));
    }

    #[test]
    fn accepts_unknown_claims() {
        let mut claims = valid_claims();
        claims["tenant"] = json!({"id": 7});
        assert_eq!(validate(&claims), Ok(()));
    }

    #[test]
    fn reports_missing_required_claim() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("role");
        let violation = validate(&claims).unwrap_err();
        assert_eq!(violation.path, "/role");
        assert_eq!(violation.expected, "string");
        assert_eq!(violation.actual, "missing");
    }

    #[test]
    fn reports_wrong_type() {
        let mut claims = valid_claims();
        claims["exp"] = json!("tomorrow");
        let violation = validate(&claims).unwrap_err();
        assert_eq!(violation.path, "/exp");
        assert_eq!(violation.expected, "integer");
        assert_eq!(violation.actual, "string");
    }

    #[test]
    fn reports_first_failing_field_deterministically() {
        let mut claims = valid_claims();
        claims["sub"] = json!(42);
        claims["aud"] = json!(false);
        let first = validate(&claims).unwrap_err();
        let second = validate(&claims).unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.path, "/aud");
    }

    #[test]
    fn rejects_non_object() {
        let violation = validate(&json!(["aud"])).unwrap_err();
        assert_eq!(violation.path, "");
        assert_eq!(violation.expected, "object");
        assert_eq!(violation.actual, "array");
    }

    #[test]
    fn rejects_non_object_amr_items() {
        let mut claims = valid_claims();
        claims["amr"] = json!(["password"]);
        let violation = validate(&claims).unwrap_err();
        assert_eq!(violation.path, "/amr/0");
        assert_eq!(violation.expected, "object");
    }

    #[test]
    fn validation_is_idempotent() {
        let claims = valid_claims();
        assert_eq!(validate(&claims), validate(&claims));
    }
}
