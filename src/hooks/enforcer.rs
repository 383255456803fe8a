//! Turn verification hook answers into enforcement actions.
//!
//! Fail-closed: any error, whether reported by the hook or raised on the way
//! to it, resolves to `Reject`. Only the decision text can fail open, and
//! only when no error is present.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::invoker::{HookInvokeError, HookInvoker};
use super::types::{
    HookError, HookOutput, HookResponse, MfaVerificationAttemptInput,
    MfaVerificationAttemptOutput, PasswordVerificationAttemptInput,
    PasswordVerificationAttemptOutput,
};
use super::{HookPoint, HOOK_REJECTION};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Continue,
    Reject,
}

impl Decision {
    /// `"reject"` rejects; anything else, empty included, continues.
    #[must_use]
    pub fn from_hook(decision: &str) -> Self {
        if decision == HOOK_REJECTION {
            Self::Reject
        } else {
            Self::Continue
        }
    }
}

/// What the auth flow must do with the attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementAction {
    pub action: Decision,
    pub user_message: String,
    /// Invalidate the user's active sessions.
    pub force_logout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
}

impl EnforcementAction {
    #[must_use]
    pub fn is_reject(&self) -> bool {
        self.action == Decision::Reject
    }

    #[must_use]
    pub fn with_force_logout(mut self, force_logout: bool) -> Self {
        self.force_logout = force_logout;
        self
    }

    fn decided(point: HookPoint, decision: &str, message: &str) -> Self {
        match Decision::from_hook(decision) {
            Decision::Reject => {
                warn!(hook.point = %point, "hook rejected attempt");
                Self::rejected(point, message, None)
            }
            Decision::Continue => {
                if !decision.is_empty() && decision != "continue" {
                    debug!(hook.point = %point, "unknown hook decision {decision:?}, continuing");
                }
                Self {
                    action: Decision::Continue,
                    user_message: message.to_string(),
                    force_logout: false,
                    http_code: None,
                }
            }
        }
    }

    fn rejected(point: HookPoint, message: &str, http_code: Option<u16>) -> Self {
        let user_message = if message.is_empty() {
            point.default_rejection_message()
        } else {
            message
        };
        Self {
            action: Decision::Reject,
            user_message: user_message.to_string(),
            force_logout: false,
            http_code,
        }
    }

    fn from_hook_error(point: HookPoint, err: &HookError) -> Self {
        warn!(
            hook.point = %point,
            http_code = ?err.http_code,
            "hook error, rejecting attempt: {}",
            err.message()
        );
        Self::rejected(point, err.message(), err.http_code)
    }

    /// The raw error is logged here and never reaches the user.
    fn fail_closed(point: HookPoint, err: &HookInvokeError) -> Self {
        error!(hook.point = %point, "hook call failed, rejecting attempt: {err}");
        Self::rejected(point, "", None)
    }
}

/// Enforcement action for an MFA verification hook result.
#[must_use]
pub fn enforce_mfa(result: Result<MfaVerificationAttemptOutput, HookInvokeError>) -> EnforcementAction {
    let point = HookPoint::MfaVerificationAttempt;
    match result {
        Ok(output) => match output.hook_error() {
            Some(err) if err.is_error() => EnforcementAction::from_hook_error(point, err),
            _ => EnforcementAction::decided(point, &output.decision, &output.message),
        },
        Err(HookInvokeError::Hook { error, .. }) => {
            EnforcementAction::from_hook_error(point, &error)
        }
        Err(err) => EnforcementAction::fail_closed(point, &err),
    }
}

/// Enforcement action for a password verification hook result.
///
/// `should_logout_user` is honoured whenever the output decoded, whether the
/// attempt continues or not.
#[must_use]
pub fn enforce_password(
    result: Result<PasswordVerificationAttemptOutput, HookInvokeError>,
) -> EnforcementAction {
    let point = HookPoint::PasswordVerificationAttempt;
    match result {
        Ok(output) => {
            let action = match output.hook_error() {
                Some(err) if err.is_error() => EnforcementAction::from_hook_error(point, err),
                _ => EnforcementAction::decided(point, &output.decision, &output.message),
            };
            action.with_force_logout(output.should_logout_user)
        }
        Err(HookInvokeError::Hook { error, output }) => {
            let force_logout = match *output {
                HookResponse::PasswordVerificationAttempt(output) => output.should_logout_user,
                _ => false,
            };
            EnforcementAction::from_hook_error(point, &error).with_force_logout(force_logout)
        }
        Err(err) => EnforcementAction::fail_closed(point, &err),
    }
}

/// Run the MFA verification hook, if one is configured.
pub async fn verify_mfa_attempt(
    invoker: &HookInvoker,
    input: &MfaVerificationAttemptInput,
) -> Option<EnforcementAction> {
    if !invoker.is_enabled(HookPoint::MfaVerificationAttempt) {
        return None;
    }
    Some(enforce_mfa(invoker.invoke(input).await))
}

/// Run the password verification hook, if one is configured.
pub async fn verify_password_attempt(
    invoker: &HookInvoker,
    input: &PasswordVerificationAttemptInput,
) -> Option<EnforcementAction> {
    if !invoker.is_enabled(HookPoint::PasswordVerificationAttempt) {
        return None;
    }
    Some(enforce_password(invoker.invoke(input).await))
}
