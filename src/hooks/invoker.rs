//! Hook invocation: one call, one classified result.

use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

use super::config::{ConfigError, HooksConfig};
use super::transport::{self, HookTransport, TransportError};
use super::types::{HookError, HookInput, HookOutput, HookRequest, HookResponse};
use super::{HookPoint, HookTimeout};

const INVALID_HOOK_RESPONSE: &str = "invalid hook response";
const HOOK_CALL_FAILED: &str = "error running hook";

#[derive(Debug, Error)]
pub enum HookInvokeError {
    /// Callers must check `HookInvoker::is_enabled` first.
    #[error("no hook configured for {0}")]
    NotConfigured(HookPoint),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid hook response from {point}: {detail}")]
    InvalidResponse { point: HookPoint, detail: String },
    /// The hook answered with an error; `output` is the decoded answer, unchanged.
    #[error("{error}")]
    Hook {
        error: HookError,
        output: Box<HookResponse>,
    },
}

impl HookInvokeError {
    /// The error in the single shape callers deal with.
    #[must_use]
    pub fn hook_error(&self) -> HookError {
        match self {
            Self::Hook { error, .. } => error.clone(),
            Self::InvalidResponse { .. } => HookError::new(Some(500), INVALID_HOOK_RESPONSE),
            Self::Transport(_) | Self::NotConfigured(_) => {
                HookError::new(Some(500), HOOK_CALL_FAILED)
            }
        }
    }

    /// `true` when the hook itself reported the error.
    #[must_use]
    pub fn is_hook_error(&self) -> bool {
        matches!(self, Self::Hook { .. })
    }
}

#[derive(Clone, Debug)]
struct RegisteredHook {
    transport: Arc<dyn HookTransport>,
    timeout: HookTimeout,
}

/// Registered hooks by point. Cheap to clone, safe to share across requests.
#[derive(Clone, Debug, Default)]
pub struct HookInvoker {
    hooks: HashMap<HookPoint, RegisteredHook>,
}

impl HookInvoker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_hook(
        mut self,
        point: HookPoint,
        transport: Arc<dyn HookTransport>,
        timeout: HookTimeout,
    ) -> Self {
        self.hooks
            .insert(point, RegisteredHook { transport, timeout });
        self
    }

    /// Build transports for every enabled hook.
    ///
    /// # Errors
    /// Returns an error if a hook is misconfigured or a `pg-functions` hook
    /// has no pool to run on.
    pub fn from_config(config: &HooksConfig, pool: Option<&PgPool>) -> Result<Self, ConfigError> {
        let mut invoker = Self::new();
        for (point, hook) in config.enabled() {
            if hook.uri().is_empty() {
                return Err(ConfigError::MissingUri(point));
            }
            let transport = transport::build(hook.transport_kind()?, pool)?;
            debug!(hook.point = %point, "registered {} hook", transport.kind());
            invoker = invoker.with_hook(point, transport, hook.timeout());
        }
        Ok(invoker)
    }

    #[must_use]
    pub fn is_enabled(&self, point: HookPoint) -> bool {
        self.hooks.contains_key(&point)
    }

    /// Call the hook registered for `R::POINT` and decode its answer.
    ///
    /// # Errors
    /// - `NotConfigured` if no hook is registered for the point.
    /// - `Transport` if the call failed or timed out.
    /// - `InvalidResponse` if the answer does not decode into `R::Output`.
    /// - `Hook` if the answer carries an error; the decoded output is attached.
    pub async fn invoke<R: HookRequest>(&self, request: &R) -> Result<R::Output, HookInvokeError> {
        let point = R::POINT;
        let hook = self
            .hooks
            .get(&point)
            .ok_or(HookInvokeError::NotConfigured(point))?;

        let envelope =
            serde_json::to_value(request).map_err(|e| TransportError::Encode(e.to_string()))?;

        let span = info_span!(
            "hook.invoke",
            hook.point = %point,
            hook.transport = hook.transport.kind(),
            hook.timeout_ms = hook.timeout.as_millis()
        );

        // Bound the call here too; a transport may ignore its timeout.
        let call = hook.transport.invoke(point, &envelope, hook.timeout);
        let raw = tokio::time::timeout(hook.timeout.duration(), call)
            .instrument(span)
            .await
            .map_err(|_| TransportError::Timeout(hook.timeout.as_millis()))??;

        let output = decode::<R::Output>(point, raw)?;

        if output.is_error() {
            let error = output.hook_error().cloned().unwrap_or_default();
            warn!(
                hook.point = %point,
                http_code = ?error.http_code,
                "hook returned error: {}",
                error.message()
            );
            return Err(HookInvokeError::Hook {
                error,
                output: Box::new(output.into_response()),
            });
        }

        Ok(output)
    }

    /// Untyped entry point: the input's tag picks the decode target.
    ///
    /// # Errors
    /// Same as [`HookInvoker::invoke`].
    pub async fn call(&self, input: &HookInput) -> Result<HookResponse, HookInvokeError> {
        match input {
            HookInput::MfaVerificationAttempt(request) => {
                self.invoke(request).await.map(HookOutput::into_response)
            }
            HookInput::PasswordVerificationAttempt(request) => {
                self.invoke(request).await.map(HookOutput::into_response)
            }
            HookInput::CustomAccessToken(request) => {
                self.invoke(request).await.map(HookOutput::into_response)
            }
        }
    }
}

fn decode<O: serde::de::DeserializeOwned>(point: HookPoint, raw: Value) -> Result<O, HookInvokeError> {
    serde_json::from_value(raw).map_err(|e| {
        warn!(hook.point = %point, "{INVALID_HOOK_RESPONSE}: {e}");
        HookInvokeError::InvalidResponse {
            point,
            detail: e.to_string(),
        }
    })
}
