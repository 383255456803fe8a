//! Hook transports: where a hook call actually goes.
//!
//! A hook URI selects the transport kind:
//! - `pg-functions://<host>/<schema>/<function>` calls a Postgres function that
//!   takes one `jsonb` argument and returns the output envelope.
//! - `https://...` (or `http://` on loopback) posts the envelope to a webhook
//!   signed with Standard Webhooks headers.
//!
//! The invoker only sees `HookTransport`, so a new kind is a new
//! implementation here and nothing else.
//!
//! Calls are never retried. Dropping the future returned by `invoke` aborts
//! the call on our side; work already done by the remote function stays done.

pub mod http;
pub mod postgres;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use sqlx::PgPool;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::{Host, Url};

use super::config::ConfigError;
use super::{HookPoint, HookTimeout};

pub use self::http::WebhookTransport;
pub use self::postgres::PgFunctionTransport;

pub const PG_FUNCTIONS_SCHEME: &str = "pg-functions";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("hook call timed out after {0} ms")]
    Timeout(u64),
    #[error("hook endpoint unreachable: {0}")]
    Connection(String),
    #[error("hook endpoint returned status {0}")]
    Status(u16),
    #[error("malformed hook response: {0}")]
    MalformedBody(String),
    #[error("hook function failed: {0}")]
    Database(String),
    #[error("failed to encode hook input: {0}")]
    Encode(String),
}

/// Delivers one input envelope and returns the raw output envelope.
#[async_trait]
pub trait HookTransport: Send + Sync + fmt::Debug {
    /// Short name used in logs and spans.
    fn kind(&self) -> &'static str;

    async fn invoke(
        &self,
        point: HookPoint,
        input: &Value,
        timeout: HookTimeout,
    ) -> Result<Value, TransportError>;
}

/// Where a hook lives.
#[derive(Clone)]
pub enum HookTransportKind {
    DatabaseFunction {
        schema: String,
        function: String,
    },
    NetworkedWebhook {
        url: Url,
        secrets: Vec<SecretString>,
    },
}

impl HookTransportKind {
    /// Parse a hook URI. Secrets only apply to webhooks.
    ///
    /// # Errors
    /// Returns an error for unsupported schemes, malformed function names,
    /// plain-HTTP webhooks outside loopback, or malformed secrets.
    pub fn parse(uri: &str, secrets: Vec<SecretString>) -> Result<Self, ConfigError> {
        let url = Url::parse(uri.trim()).map_err(|e| ConfigError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            PG_FUNCTIONS_SCHEME => {
                let segments: Vec<&str> = url
                    .path_segments()
                    .map(|s| s.filter(|segment| !segment.is_empty()).collect())
                    .unwrap_or_default();
                let [schema, function] = segments.as_slice() else {
                    return Err(ConfigError::InvalidUri {
                        uri: uri.to_string(),
                        reason: "expected pg-functions://<host>/<schema>/<function>".to_string(),
                    });
                };
                postgres::check_identifier(schema)?;
                postgres::check_identifier(function)?;
                Ok(Self::DatabaseFunction {
                    schema: (*schema).to_string(),
                    function: (*function).to_string(),
                })
            }
            "https" => {
                http::check_secrets(&secrets)?;
                Ok(Self::NetworkedWebhook { url, secrets })
            }
            "http" if is_local_host(&url) => {
                http::check_secrets(&secrets)?;
                Ok(Self::NetworkedWebhook { url, secrets })
            }
            "http" => Err(ConfigError::InvalidUri {
                uri: uri.to_string(),
                reason: "webhooks must use https outside localhost".to_string(),
            }),
            scheme => Err(ConfigError::InvalidUri {
                uri: uri.to_string(),
                reason: format!("unsupported scheme {scheme}"),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DatabaseFunction { .. } => postgres::KIND,
            Self::NetworkedWebhook { .. } => http::KIND,
        }
    }
}

impl fmt::Debug for HookTransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DatabaseFunction { schema, function } => f
                .debug_struct("DatabaseFunction")
                .field("schema", schema)
                .field("function", function)
                .finish(),
            Self::NetworkedWebhook { url, secrets } => f
                .debug_struct("NetworkedWebhook")
                .field("url", &url.as_str())
                .field("secrets", &format!("{} x ***", secrets.len()))
                .finish(),
        }
    }
}

fn is_local_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost" || domain == "host.docker.internal",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Build the transport for a parsed kind.
///
/// # Errors
/// Returns an error if a database function hook has no pool or the HTTP
/// client cannot be constructed.
pub fn build(
    kind: HookTransportKind,
    pool: Option<&PgPool>,
) -> Result<Arc<dyn HookTransport>, ConfigError> {
    match kind {
        HookTransportKind::DatabaseFunction { schema, function } => {
            let pool = pool.ok_or(ConfigError::MissingPool)?.clone();
            Ok(Arc::new(PgFunctionTransport::new(pool, &schema, &function)?))
        }
        HookTransportKind::NetworkedWebhook { url, secrets } => Ok(Arc::new(
            WebhookTransport::new(crate::APP_USER_AGENT, url, secrets)?,
        )),
    }
}
