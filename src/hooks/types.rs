//! Wire envelopes exchanged with hook endpoints.
//!
//! Field names are part of the contract with operator code and must not
//! change. Every output type carries an optional `error` object; a non-empty
//! `error.message` marks the whole output as an error, whatever else it says.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::HookPoint;

/// Error reported by the hook itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{}", .message.as_deref().unwrap_or("hook error"))]
pub struct HookError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HookError {
    #[must_use]
    pub fn new(http_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            http_code,
            message: Some(message.into()),
        }
    }

    /// Only a non-empty message counts; `http_code` alone is ignored.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.message.as_deref().is_some_and(|m| !m.is_empty())
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

/// Shared error capability of every hook output.
pub trait HookOutput {
    fn hook_error(&self) -> Option<&HookError>;

    /// Wrap the concrete output in its `HookResponse` variant.
    fn into_response(self) -> HookResponse;

    fn is_error(&self) -> bool {
        self.hook_error().is_some_and(HookError::is_error)
    }

    fn error_message(&self) -> &str {
        self.hook_error().map_or("", HookError::message)
    }
}

/// Input envelope bound to the point it is sent to and the output it expects.
pub trait HookRequest: Serialize + Send + Sync {
    type Output: HookOutput + DeserializeOwned + Send;
    const POINT: HookPoint;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaVerificationAttemptInput {
    pub user_id: Uuid,
    pub factor_id: Uuid,
    pub valid: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaVerificationAttemptOutput {
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HookError>,
}

impl HookRequest for MfaVerificationAttemptInput {
    type Output = MfaVerificationAttemptOutput;
    const POINT: HookPoint = HookPoint::MfaVerificationAttempt;
}

impl HookOutput for MfaVerificationAttemptOutput {
    fn hook_error(&self) -> Option<&HookError> {
        self.error.as_ref()
    }

    fn into_response(self) -> HookResponse {
        HookResponse::MfaVerificationAttempt(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordVerificationAttemptInput {
    pub user_id: Uuid,
    pub valid: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordVerificationAttemptOutput {
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub should_logout_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HookError>,
}

impl HookRequest for PasswordVerificationAttemptInput {
    type Output = PasswordVerificationAttemptOutput;
    const POINT: HookPoint = HookPoint::PasswordVerificationAttempt;
}

impl HookOutput for PasswordVerificationAttemptOutput {
    fn hook_error(&self) -> Option<&HookError> {
        self.error.as_ref()
    }

    fn into_response(self) -> HookResponse {
        HookResponse::PasswordVerificationAttempt(self)
    }
}

/// Authentication method reference entry (`amr` claim).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmrEntry {
    pub method: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Claims of an access token before any hook customization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iss: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aud: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub exp: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub iat: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub nbf: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jti: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aal: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amr: Vec<AmrEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AccessTokenClaims {
    /// Claims as the JSON object that ends up in the token body.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomAccessTokenInput {
    pub user_id: Uuid,
    pub claims: AccessTokenClaims,
    pub authentication_method: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomAccessTokenOutput {
    #[serde(default)]
    pub claims: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HookError>,
}

impl HookRequest for CustomAccessTokenInput {
    type Output = CustomAccessTokenOutput;
    const POINT: HookPoint = HookPoint::CustomAccessToken;
}

impl HookOutput for CustomAccessTokenOutput {
    fn hook_error(&self) -> Option<&HookError> {
        self.error.as_ref()
    }

    fn into_response(self) -> HookResponse {
        HookResponse::CustomAccessToken(self)
    }
}

/// Input for any hook point.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HookInput {
    MfaVerificationAttempt(MfaVerificationAttemptInput),
    PasswordVerificationAttempt(PasswordVerificationAttemptInput),
    CustomAccessToken(CustomAccessTokenInput),
}

impl HookInput {
    #[must_use]
    pub fn point(&self) -> HookPoint {
        match self {
            Self::MfaVerificationAttempt(_) => HookPoint::MfaVerificationAttempt,
            Self::PasswordVerificationAttempt(_) => HookPoint::PasswordVerificationAttempt,
            Self::CustomAccessToken(_) => HookPoint::CustomAccessToken,
        }
    }

    /// Decode an input envelope for `point`.
    ///
    /// # Errors
    /// Returns an error if `value` does not match the point's input shape.
    pub fn from_value(point: HookPoint, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match point {
            HookPoint::MfaVerificationAttempt => {
                Self::MfaVerificationAttempt(serde_json::from_value(value)?)
            }
            HookPoint::PasswordVerificationAttempt => {
                Self::PasswordVerificationAttempt(serde_json::from_value(value)?)
            }
            HookPoint::CustomAccessToken => Self::CustomAccessToken(serde_json::from_value(value)?),
        })
    }
}

/// Output of any hook point, tagged by the point that produced it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HookResponse {
    MfaVerificationAttempt(MfaVerificationAttemptOutput),
    PasswordVerificationAttempt(PasswordVerificationAttemptOutput),
    CustomAccessToken(CustomAccessTokenOutput),
}

impl HookResponse {
    #[must_use]
    pub fn point(&self) -> HookPoint {
        match self {
            Self::MfaVerificationAttempt(_) => HookPoint::MfaVerificationAttempt,
            Self::PasswordVerificationAttempt(_) => HookPoint::PasswordVerificationAttempt,
            Self::CustomAccessToken(_) => HookPoint::CustomAccessToken,
        }
    }

    /// Decode a raw output envelope into the concrete type for `point`.
    ///
    /// # Errors
    /// Returns an error if a field has the wrong type or the value is not an object.
    pub fn decode(point: HookPoint, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match point {
            HookPoint::MfaVerificationAttempt => {
                Self::MfaVerificationAttempt(serde_json::from_value(value)?)
            }
            HookPoint::PasswordVerificationAttempt => {
                Self::PasswordVerificationAttempt(serde_json::from_value(value)?)
            }
            HookPoint::CustomAccessToken => Self::CustomAccessToken(serde_json::from_value(value)?),
        })
    }
}

impl HookOutput for HookResponse {
    fn hook_error(&self) -> Option<&HookError> {
        match self {
            Self::MfaVerificationAttempt(output) => output.hook_error(),
            Self::PasswordVerificationAttempt(output) => output.hook_error(),
            Self::CustomAccessToken(output) => output.hook_error(),
        }
    }

    fn into_response(self) -> HookResponse {
        self
    }
}
