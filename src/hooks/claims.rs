//! Access token customization.
//!
//! Fail-safe: a token hook that errors, times out or produces claims that no
//! longer satisfy the minimum token schema leaves the base claims untouched.
//! The login goes ahead uncustomized and the reason is kept for logging only.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::invoker::{HookInvokeError, HookInvoker};
use super::schema::{self, SchemaViolation};
use super::types::{
    AccessTokenClaims, CustomAccessTokenInput, CustomAccessTokenOutput, HookError, HookOutput,
};
use super::HookPoint;

/// Why hook overrides were not applied. Never shown to end users.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum MergeRejection {
    #[error("hook error: {0}")]
    Hook(HookError),
    #[error("hook call failed: {0}")]
    Invoke(String),
    #[error("customized claims rejected: {0}")]
    Schema(SchemaViolation),
}

/// Claims to mint, plus what happened to the hook overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct ClaimsMerge {
    pub claims: Map<String, Value>,
    /// `true` when the hook overrides were applied.
    pub customized: bool,
    pub rejection: Option<MergeRejection>,
}

impl ClaimsMerge {
    fn base(claims: Map<String, Value>, rejection: MergeRejection) -> Self {
        warn!(hook.point = %HookPoint::CustomAccessToken, "using base claims: {rejection}");
        Self {
            claims,
            customized: false,
            rejection: Some(rejection),
        }
    }
}

fn validated_base(base: &AccessTokenClaims) -> Result<Map<String, Value>, SchemaViolation> {
    let claims = base.to_map();
    schema::validate(&Value::Object(claims.clone()))?;
    Ok(claims)
}

/// Apply the hook's top-level overrides to `base`.
///
/// # Errors
/// Returns the violation if `base` itself does not satisfy the minimum token
/// schema; such claims must not be minted with or without a hook.
pub fn merge(
    base: &AccessTokenClaims,
    output: &CustomAccessTokenOutput,
) -> Result<ClaimsMerge, SchemaViolation> {
    let claims = validated_base(base)?;

    if let Some(err) = output.hook_error().filter(|err| err.is_error()) {
        return Ok(ClaimsMerge::base(claims, MergeRejection::Hook(err.clone())));
    }

    let mut merged = claims.clone();
    for (key, value) in &output.claims {
        merged.insert(key.clone(), value.clone());
    }

    if let Err(violation) = schema::validate(&Value::Object(merged.clone())) {
        return Ok(ClaimsMerge::base(claims, MergeRejection::Schema(violation)));
    }

    debug!(
        hook.point = %HookPoint::CustomAccessToken,
        overridden = output.claims.len(),
        "customized access token claims"
    );
    Ok(ClaimsMerge {
        claims: merged,
        customized: true,
        rejection: None,
    })
}

/// [`merge`] over an invoker result, folding call failures into base claims.
///
/// # Errors
/// Returns the violation if `base` does not satisfy the minimum token schema.
pub fn merge_result(
    base: &AccessTokenClaims,
    result: Result<CustomAccessTokenOutput, HookInvokeError>,
) -> Result<ClaimsMerge, SchemaViolation> {
    match result {
        Ok(output) => merge(base, &output),
        Err(HookInvokeError::Hook { error, .. }) => {
            Ok(ClaimsMerge::base(validated_base(base)?, MergeRejection::Hook(error)))
        }
        Err(err) => Ok(ClaimsMerge::base(
            validated_base(base)?,
            MergeRejection::Invoke(err.to_string()),
        )),
    }
}

/// Run the access token hook, if one is configured.
pub async fn customize_access_token(
    invoker: &HookInvoker,
    input: &CustomAccessTokenInput,
) -> Option<Result<ClaimsMerge, SchemaViolation>> {
    if !invoker.is_enabled(HookPoint::CustomAccessToken) {
        return None;
    }
    Some(merge_result(&input.claims, invoker.invoke(input).await))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::hooks::invoker::tests::StubTransport;
    use crate::hooks::transport::TransportError;
    use crate::hooks::types::AmrEntry;
    use crate::hooks::HookTimeout;
    use serde_json::json;
    use uuid::Uuid;

    fn base_claims() -> AccessTokenClaims {
        AccessTokenClaims {
            iss: "https://auth.example.com".to_string(),
            sub: "11111111-1111-1111-1111-111111111111".to_string(),
            aud: "authenticated".to_string(),
            exp: 1_900_000_000,
            iat: 1_800_000_000,
            email: "user@example.com".to_string(),
            phone: String::new(),
            role: "anon".to_string(),
            aal: Some("aal1".to_string()),
            amr: vec![AmrEntry {
                method: "password".to_string(),
                timestamp: 1_800_000_000,
                provider: None,
            }],
            session_id: Some("33333333-3333-3333-3333-333333333333".to_string()),
            ..AccessTokenClaims::default()
        }
    }

    fn overrides(value: Value) -> CustomAccessTokenOutput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn overrides_replace_and_add_claims() {
        let base = base_claims();
        let output = overrides(json!({
            "claims": {"role": "authenticated", "app_metadata": {"provider": "email"}}
        }));

        let merged = merge(&base, &output).unwrap();
        assert!(merged.customized);
        assert_eq!(merged.rejection, None);
        assert_eq!(merged.claims["role"], "authenticated");
        assert_eq!(merged.claims["app_metadata"], json!({"provider": "email"}));
        for claim in ["aud", "exp", "iat", "sub", "email", "phone", "aal"] {
            assert_eq!(merged.claims[claim], base.to_map()[claim], "claim {claim}");
        }
    }

    #[test]
    fn custom_claims_pass_through() {
        let output = overrides(json!({"claims": {"tenant": "acme", "roles": ["admin"]}}));
        let merged = merge(&base_claims(), &output).unwrap();
        assert_eq!(merged.claims["tenant"], "acme");
        assert_eq!(merged.claims["roles"], json!(["admin"]));
    }

    #[test]
    fn hook_error_keeps_base_claims() {
        let base = base_claims();
        let output = overrides(json!({
            "claims": {"role": "service_role"},
            "error": {"http_code": 500, "message": "lookup failed"}
        }));

        let merged = merge(&base, &output).unwrap();
        assert!(!merged.customized);
        assert_eq!(merged.claims, base.to_map());
        assert_eq!(
            merged.rejection,
            Some(MergeRejection::Hook(HookError::new(Some(500), "lookup failed")))
        );
    }

    #[test]
    fn removing_required_claim_is_rejected() {
        let base = base_claims();
        let output = overrides(json!({"claims": {"role": null}}));

        let merged = merge(&base, &output).unwrap();
        assert!(!merged.customized);
        assert_eq!(merged.claims, base.to_map());
        match merged.rejection {
            Some(MergeRejection::Schema(violation)) => {
                assert_eq!(violation.path, "/role");
                assert_eq!(violation.actual, "null");
            }
            other => panic!("expected schema rejection, got {other:?}"),
        }
    }

    #[test]
    fn mistyped_override_is_rejected() {
        let output = overrides(json!({"claims": {"exp": "tomorrow"}}));
        let merged = merge(&base_claims(), &output).unwrap();
        assert!(matches!(merged.rejection, Some(MergeRejection::Schema(_))));
        assert_eq!(merged.claims["exp"], 1_900_000_000);
    }

    #[test]
    fn invalid_base_claims_are_an_error() {
        let base = AccessTokenClaims {
            aal: None,
            ..base_claims()
        };
        let violation = merge(&base, &CustomAccessTokenOutput::default()).unwrap_err();
        assert_eq!(violation.path, "/aal");
        assert_eq!(violation.actual, "missing");
    }

    #[test]
    fn invoke_failure_keeps_base_claims() {
        let base = base_claims();
        let merged = merge_result(
            &base,
            Err(HookInvokeError::Transport(TransportError::Status(502))),
        )
        .unwrap();
        assert!(!merged.customized);
        assert_eq!(merged.claims, base.to_map());
        assert!(matches!(merged.rejection, Some(MergeRejection::Invoke(_))));
    }

    #[tokio::test]
    async fn customize_runs_configured_hook() {
        let stub = StubTransport::answering(json!({
            "claims": {"role": "authenticated", "app_metadata": {"provider": "email"}}
        }));
        let invoker = HookInvoker::new().with_hook(
            HookPoint::CustomAccessToken,
            stub.clone(),
            HookTimeout::default(),
        );
        let input = CustomAccessTokenInput {
            user_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap(),
            claims: base_claims(),
            authentication_method: "password".to_string(),
        };

        let merged = customize_access_token(&invoker, &input)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged.claims["role"], "authenticated");

        let received = stub.received.lock().unwrap();
        assert_eq!(received[0].1["authentication_method"], "password");
        assert_eq!(received[0].1["claims"]["role"], "anon");
    }

    #[tokio::test]
    async fn customize_without_hook_is_none() {
        let input = CustomAccessTokenInput {
            user_id: Uuid::new_v4(),
            claims: base_claims(),
            authentication_method: "password".to_string(),
        };
        assert!(customize_access_token(&HookInvoker::new(), &input)
            .await
            .is_none());
    }
}
