//! Authentication hooks.
//!
//! Operators can register a decision function at a fixed set of points in the
//! authentication lifecycle. The server sends a typed input envelope, the
//! function answers with a typed output envelope, and this module turns that
//! answer into something the auth flow can apply.
//!
//! Flow Overview:
//! 1) The auth flow checks `HookInvoker::is_enabled` for the point.
//! 2) `HookInvoker` serializes the input and hands it to the registered
//!    `HookTransport` (Postgres function or webhook) under its timeout.
//! 3) The raw output is decoded into the point's concrete output type.
//! 4) Verification points go through the `enforcer`, the token point through
//!    the `claims` merger.
//!
//! Security boundaries:
//! - Verification hooks fail closed: transport errors, malformed output and
//!   hook errors all resolve to `Reject`.
//! - The token hook fails safe: any failure leaves the base claims untouched,
//!   and merged claims must still satisfy the minimum token schema.
//! - Hook calls are never retried. A decision function that increments a
//!   counter must be idempotent per logical attempt; this layer does not
//!   deduplicate.

pub mod claims;
pub mod config;
pub mod enforcer;
pub mod invoker;
pub mod schema;
pub mod transport;
pub mod types;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use self::claims::{customize_access_token, merge, merge_result, ClaimsMerge, MergeRejection};
pub use self::config::{ConfigError, HookConfig, HooksConfig};
pub use self::enforcer::{
    enforce_mfa, enforce_password, verify_mfa_attempt, verify_password_attempt, Decision,
    EnforcementAction,
};
pub use self::invoker::{HookInvokeError, HookInvoker};
pub use self::schema::{validate, SchemaViolation};
pub use self::transport::{HookTransport, HookTransportKind, TransportError};
pub use self::types::{
    AccessTokenClaims, AmrEntry, CustomAccessTokenInput, CustomAccessTokenOutput, HookError,
    HookInput, HookOutput, HookRequest, HookResponse, MfaVerificationAttemptInput,
    MfaVerificationAttemptOutput, PasswordVerificationAttemptInput,
    PasswordVerificationAttemptOutput,
};

/// Decision value a hook returns to deny the attempt.
pub const HOOK_REJECTION: &str = "reject";

pub const DEFAULT_MFA_HOOK_REJECTION_MESSAGE: &str =
    "Further MFA verification attempts will be rejected.";
pub const DEFAULT_PASSWORD_HOOK_REJECTION_MESSAGE: &str =
    "Further password verification attempts will be rejected.";

const DEFAULT_HOOK_TIMEOUT_MS: u64 = 2000;

/// Extension points a hook can be registered on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    MfaVerificationAttempt,
    PasswordVerificationAttempt,
    CustomAccessToken,
}

impl HookPoint {
    pub const ALL: [Self; 3] = [
        Self::MfaVerificationAttempt,
        Self::PasswordVerificationAttempt,
        Self::CustomAccessToken,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MfaVerificationAttempt => "mfa_verification_attempt",
            Self::PasswordVerificationAttempt => "password_verification_attempt",
            Self::CustomAccessToken => "custom_access_token",
        }
    }

    /// Prefix used for this point's environment variables.
    #[must_use]
    pub fn env_prefix(self) -> String {
        format!("PERMESI_HOOK_{}", self.as_str().to_ascii_uppercase())
    }

    /// Message shown to the user when the hook denies without saying why.
    #[must_use]
    pub fn default_rejection_message(self) -> &'static str {
        match self {
            Self::MfaVerificationAttempt => DEFAULT_MFA_HOOK_REJECTION_MESSAGE,
            Self::PasswordVerificationAttempt => DEFAULT_PASSWORD_HOOK_REJECTION_MESSAGE,
            Self::CustomAccessToken => "",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "mfa_verification_attempt" => Ok(Self::MfaVerificationAttempt),
            "password_verification_attempt" => Ok(Self::PasswordVerificationAttempt),
            "custom_access_token" => Ok(Self::CustomAccessToken),
            other => Err(format!("unknown hook point: {other}")),
        }
    }
}

/// Upper bound for a single hook call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookTimeout(Duration);

impl HookTimeout {
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Self::default()
        } else {
            Self(Duration::from_millis(ms))
        }
    }

    #[must_use]
    pub fn duration(self) -> Duration {
        self.0
    }

    #[must_use]
    pub fn as_millis(self) -> u64 {
        u64::try_from(self.0.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for HookTimeout {
    fn default() -> Self {
        Self(Duration::from_millis(DEFAULT_HOOK_TIMEOUT_MS))
    }
}
