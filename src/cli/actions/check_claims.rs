use super::read_json;
use crate::hooks::schema;
use anyhow::{bail, Result};
use serde_json::{json, Value};

#[derive(Debug)]
pub struct Args {
    pub claims: String,
}

/// Validate the claims and build the report.
///
/// # Errors
/// Returns an error if the claims cannot be read or parsed.
pub fn run(args: &Args) -> Result<Value> {
    let claims = read_json(&args.claims)?;
    Ok(match schema::validate(&claims) {
        Ok(()) => json!({"valid": true}),
        Err(violation) => json!({
            "valid": false,
            "path": violation.path,
            "expected": violation.expected,
            "actual": violation.actual,
        }),
    })
}

/// # Errors
/// Returns an error if the claims cannot be read or violate the schema.
pub fn execute(args: Args) -> Result<()> {
    let report = run(&args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.get("valid") != Some(&Value::Bool(true)) {
        bail!("claims do not satisfy the minimum token schema");
    }
    Ok(())
}
