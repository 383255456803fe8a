use super::read_json;
use crate::hooks::{
    customize_access_token, verify_mfa_attempt, verify_password_attempt, HookConfig, HookInput,
    HookInvoker, HookPoint, HookTimeout, HookTransportKind, HooksConfig,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub point: HookPoint,
    pub uri: String,
    pub secrets: Vec<SecretString>,
    pub dsn: Option<String>,
    pub timeout: HookTimeout,
    pub input: String,
}

async fn connect(dsn: Option<&str>) -> Result<PgPool> {
    let dsn = dsn.context("--dsn is required for pg-functions hooks")?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;
    debug!("connected to database");
    Ok(pool)
}

/// Run the hook once and build the report.
///
/// # Errors
/// Returns an error if the input or hook configuration is invalid, or the
/// database cannot be reached for a `pg-functions` hook.
pub async fn run(args: Args) -> Result<Value> {
    let point = args.point;
    let input = HookInput::from_value(point, read_json(&args.input)?)
        .with_context(|| format!("input does not match the {point} envelope"))?;

    let hook = HookConfig::new(args.uri)
        .with_secrets(args.secrets)
        .with_timeout(args.timeout);
    let pool = match hook.transport_kind()? {
        HookTransportKind::DatabaseFunction { .. } => Some(connect(args.dsn.as_deref()).await?),
        HookTransportKind::NetworkedWebhook { .. } => None,
    };

    let config = HooksConfig::new().with_hook(point, hook);
    let invoker = HookInvoker::from_config(&config, pool.as_ref())?;

    info!(hook.point = %point, "invoking hook");

    let report = match input {
        HookInput::MfaVerificationAttempt(input) => {
            let action = verify_mfa_attempt(&invoker, &input)
                .await
                .context("hook is not configured")?;
            serde_json::to_value(action)?
        }
        HookInput::PasswordVerificationAttempt(input) => {
            let action = verify_password_attempt(&invoker, &input)
                .await
                .context("hook is not configured")?;
            serde_json::to_value(action)?
        }
        HookInput::CustomAccessToken(input) => {
            let merged = customize_access_token(&invoker, &input)
                .await
                .context("hook is not configured")?
                .context("base claims do not satisfy the minimum token schema")?;
            json!({
                "claims": merged.claims,
                "customized": merged.customized,
                "rejection": merged.rejection.map(|rejection| rejection.to_string()),
            })
        }
    };

    Ok(report)
}

/// # Errors
/// Returns an error if the hook cannot be run.
pub async fn execute(args: Args) -> Result<()> {
    let report = run(args).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
