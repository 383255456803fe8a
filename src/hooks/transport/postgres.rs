//! Postgres function transport (`pg-functions://`).
//!
//! The hook is a function taking a single `jsonb` argument and returning
//! `jsonb`. Each call runs in its own transaction with `statement_timeout`
//! set to the hook timeout, so a slow function is cancelled server-side too.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use sqlx::PgPool;
use std::fmt;
use std::sync::OnceLock;
use tokio::time::timeout;
use tracing::{debug, error, info_span, Instrument};

use super::{HookTransport, TransportError};
use crate::hooks::config::ConfigError;
use crate::hooks::{HookPoint, HookTimeout};

pub const KIND: &str = "pg-functions";

/// SQLSTATE for `query_canceled`, raised when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";
const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();

/// Check a schema or function name before it is interpolated into SQL.
///
/// # Errors
/// Returns an error unless the name is a plain Postgres identifier.
pub fn check_identifier(name: &str) -> Result<(), ConfigError> {
    let valid = name.len() <= MAX_IDENTIFIER_LEN
        && IDENTIFIER
            .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
            .as_ref()
            .is_some_and(|re| re.is_match(name));

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(name.to_string()))
    }
}

#[derive(Clone)]
pub struct PgFunctionTransport {
    pool: PgPool,
    schema: String,
    function: String,
}

impl PgFunctionTransport {
    /// # Errors
    /// Returns an error if `schema` or `function` is not a valid identifier.
    pub fn new(pool: PgPool, schema: &str, function: &str) -> Result<Self, ConfigError> {
        check_identifier(schema)?;
        check_identifier(function)?;
        Ok(Self {
            pool,
            schema: schema.to_string(),
            function: function.to_string(),
        })
    }

    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.function)
    }

    fn statement(&self) -> String {
        format!("SELECT {}($1::jsonb)::text AS output", self.qualified_name())
    }

    async fn call(
        &self,
        input: String,
        hook_timeout: HookTimeout,
    ) -> Result<Option<String>, TransportError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error(&e, hook_timeout))?;

        // SET cannot take bind parameters; the value is a plain integer.
        let set_timeout = format!(
            "SET LOCAL statement_timeout TO '{}'",
            hook_timeout.as_millis()
        );
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(&e, hook_timeout))?;

        let statement = self.statement();
        let output = sqlx::query_scalar::<_, Option<String>>(&statement)
            .bind(input)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error(&e, hook_timeout))?;

        tx.commit().await.map_err(|e| db_error(&e, hook_timeout))?;

        Ok(output)
    }
}

fn db_error(err: &sqlx::Error, hook_timeout: HookTimeout) -> TransportError {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
            TransportError::Timeout(hook_timeout.as_millis())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            TransportError::Connection(err.to_string())
        }
        _ => TransportError::Database(err.to_string()),
    }
}

#[async_trait]
impl HookTransport for PgFunctionTransport {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn invoke(
        &self,
        point: HookPoint,
        input: &Value,
        hook_timeout: HookTimeout,
    ) -> Result<Value, TransportError> {
        let input =
            serde_json::to_string(input).map_err(|e| TransportError::Encode(e.to_string()))?;

        let statement = self.statement();
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %statement,
            hook.point = %point
        );

        let output = timeout(hook_timeout.duration(), self.call(input, hook_timeout))
            .instrument(span)
            .await
            .map_err(|_| TransportError::Timeout(hook_timeout.as_millis()))?
            .map_err(|err| {
                error!(hook.point = %point, "hook function {} failed: {err}", self.qualified_name());
                err
            })?;

        let Some(output) = output else {
            return Err(TransportError::MalformedBody(
                "hook function returned NULL".to_string(),
            ));
        };

        debug!(hook.point = %point, "hook function {} returned", self.qualified_name());

        serde_json::from_str(&output).map_err(|e| TransportError::MalformedBody(e.to_string()))
    }
}

impl fmt::Debug for PgFunctionTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgFunctionTransport")
            .field("function", &self.qualified_name())
            .finish_non_exhaustive()
    }
}
