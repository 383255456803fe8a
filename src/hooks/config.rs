//! Hook registration settings.
//!
//! Each hook point is configured independently through environment variables
//! sharing the point's prefix, e.g. for the MFA hook:
//!
//! - `PERMESI_HOOK_MFA_VERIFICATION_ATTEMPT_ENABLED=true`
//! - `PERMESI_HOOK_MFA_VERIFICATION_ATTEMPT_URI=pg-functions://postgres/public/mfa_attempt`
//! - `PERMESI_HOOK_MFA_VERIFICATION_ATTEMPT_SECRETS=v1,whsec_...|v1,whsec_...`
//! - `PERMESI_HOOK_MFA_VERIFICATION_ATTEMPT_TIMEOUT_MS=2000`

use secrecy::SecretString;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use super::transport::HookTransportKind;
use super::{HookPoint, HookTimeout};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid hook uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("invalid identifier in hook uri: {0}")]
    InvalidIdentifier(String),
    #[error("invalid hook secret: {0}")]
    InvalidSecret(String),
    #[error("hook {0} is enabled but has no uri")]
    MissingUri(HookPoint),
    #[error("pg-functions hooks require a database pool")]
    MissingPool,
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Settings for one hook point.
#[derive(Clone, Default)]
pub struct HookConfig {
    enabled: bool,
    uri: String,
    secrets: Vec<SecretString>,
    timeout: HookTimeout,
}

impl HookConfig {
    /// An enabled hook pointing at `uri` with the default timeout.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            enabled: true,
            uri: uri.into(),
            secrets: Vec::new(),
            timeout: HookTimeout::default(),
        }
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_secrets(mut self, secrets: Vec<SecretString>) -> Self {
        self.secrets = secrets;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: HookTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn secrets(&self) -> &[SecretString] {
        &self.secrets
    }

    #[must_use]
    pub fn timeout(&self) -> HookTimeout {
        self.timeout
    }

    /// Parse the URI and secrets into a transport kind.
    ///
    /// # Errors
    /// Returns an error if the URI or a secret is invalid.
    pub fn transport_kind(&self) -> Result<HookTransportKind, ConfigError> {
        HookTransportKind::parse(&self.uri, self.secrets.clone())
    }

    fn from_env(point: HookPoint) -> Option<Self> {
        let prefix = point.env_prefix();
        let enabled = parse_bool_env(&format!("{prefix}_ENABLED")).unwrap_or(false);
        let uri = std::env::var(format!("{prefix}_URI"))
            .ok()
            .map(|uri| uri.trim().to_string())
            .unwrap_or_default();

        if !enabled && uri.is_empty() {
            return None;
        }

        let secrets = std::env::var(format!("{prefix}_SECRETS"))
            .ok()
            .map(|raw| parse_secrets(&raw))
            .unwrap_or_default();
        let timeout = std::env::var(format!("{prefix}_TIMEOUT_MS"))
            .ok()
            .and_then(|ms| ms.trim().parse::<u64>().ok())
            .map_or_else(HookTimeout::default, HookTimeout::from_millis);

        Some(Self {
            enabled,
            uri,
            secrets,
            timeout,
        })
    }
}

impl fmt::Debug for HookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookConfig")
            .field("enabled", &self.enabled)
            .field("uri", &self.uri)
            .field("secrets", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Split a `|`-separated secret list, dropping blanks.
fn parse_secrets(raw: &str) -> Vec<SecretString> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| SecretString::from(s.to_string()))
        .collect()
}

fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|value| match value.trim() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
}

/// Settings for every hook point.
#[derive(Clone, Debug, Default)]
pub struct HooksConfig {
    hooks: HashMap<HookPoint, HookConfig>,
}

impl HooksConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_hook(mut self, point: HookPoint, config: HookConfig) -> Self {
        self.hooks.insert(point, config);
        self
    }

    #[must_use]
    pub fn get(&self, point: HookPoint) -> Option<&HookConfig> {
        self.hooks.get(&point)
    }

    /// Enabled hooks only.
    pub fn enabled(&self) -> impl Iterator<Item = (HookPoint, &HookConfig)> {
        HookPoint::ALL
            .into_iter()
            .filter_map(|point| self.hooks.get(&point).map(|config| (point, config)))
            .filter(|(_, config)| config.enabled())
    }

    /// Load hook configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        HookPoint::ALL
            .into_iter()
            .filter_map(|point| HookConfig::from_env(point).map(|config| (point, config)))
            .fold(Self::new(), |config, (point, hook)| config.with_hook(point, hook))
    }

    /// Check every enabled hook.
    ///
    /// # Errors
    /// Returns the first invalid URI or secret found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (point, config) in self.enabled() {
            if config.uri().is_empty() {
                return Err(ConfigError::MissingUri(point));
            }
            config.transport_kind()?;
        }
        Ok(())
    }
}
