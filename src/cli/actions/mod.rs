pub mod check_claims;
pub mod invoke;

use anyhow::{Context, Result};
use serde_json::Value;

#[derive(Debug)]
pub enum Action {
    Invoke(invoke::Args),
    CheckClaims(check_claims::Args),
}

impl Action {
    /// Execute the action and print its JSON report on stdout.
    ///
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Invoke(args) => invoke::execute(args).await,
            Self::CheckClaims(args) => check_claims::execute(args),
        }
    }
}

/// Read a JSON argument given inline or as `@path`.
pub(crate) fn read_json(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?
        }
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("argument is not valid JSON")
}
