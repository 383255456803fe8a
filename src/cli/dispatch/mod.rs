//! Map validated CLI matches to an action.

use crate::cli::actions::{check_claims, invoke, Action};
use crate::cli::commands::{
    self,
    hooks::{self, InvokeOptions, CMD_CHECK_CLAIMS, CMD_INVOKE},
    logging::LogSettings,
};
use crate::cli::telemetry;
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;

/// Parse the process arguments, set up logging and build the action.
///
/// # Errors
/// Returns an error if telemetry cannot be initialized or the arguments do
/// not map to an action.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(LogSettings::from_matches(&matches))?;

    handler(&matches)
}

/// # Errors
/// Returns an error if the subcommand is unknown or required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_INVOKE, sub_m)) => {
            let options = InvokeOptions::parse(sub_m)?;
            Ok(Action::Invoke(invoke::Args {
                point: options.point,
                uri: options.uri,
                secrets: options
                    .secrets
                    .into_iter()
                    .map(SecretString::from)
                    .collect(),
                dsn: options.dsn,
                timeout: options.timeout,
                input: options.input,
            }))
        }
        Some((CMD_CHECK_CLAIMS, sub_m)) => Ok(Action::CheckClaims(check_claims::Args {
            claims: sub_m
                .get_one::<String>(hooks::ARG_CLAIMS)
                .cloned()
                .context("missing required argument: --claims")?,
        })),
        Some((name, _)) => Err(anyhow!("unknown command: {name}")),
        None => Err(anyhow!("missing command")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::hooks::HookPoint;

    #[test]
    fn dispatches_invoke() {
        temp_env::with_vars(
            [
                ("PERMESI_HOOK_SECRETS", None::<&str>),
                ("PERMESI_HOOKS_DSN", None),
                ("PERMESI_HOOK_TIMEOUT_MS", None),
            ],
            || {
                let matches = commands::new().get_matches_from(vec![
                    "permesi-hooks",
                    "invoke",
                    "--hook",
                    "password_verification_attempt",
                    "--uri",
                    "http://localhost:54321/password",
                    "--input",
                    "@input.json",
                ]);
                match handler(&matches).unwrap() {
                    Action::Invoke(args) => {
                        assert_eq!(args.point, HookPoint::PasswordVerificationAttempt);
                        assert_eq!(args.input, "@input.json");
                        assert!(args.secrets.is_empty());
                    }
                    Action::CheckClaims(_) => panic!("expected invoke"),
                }
            },
        );
    }

    #[test]
    fn dispatches_check_claims() {
        let matches =
            commands::new().get_matches_from(vec!["permesi-hooks", "check-claims", "-c", "{}"]);
        assert!(matches!(
            handler(&matches).unwrap(),
            Action::CheckClaims(check_claims::Args { claims }) if claims == "{}"
        ));
    }
}
