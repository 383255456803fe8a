use crate::hooks::{HookPoint, HookTimeout};
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

pub const CMD_INVOKE: &str = "invoke";
pub const CMD_CHECK_CLAIMS: &str = "check-claims";

pub const ARG_HOOK: &str = "hook";
pub const ARG_URI: &str = "uri";
pub const ARG_SECRET: &str = "secret";
pub const ARG_DSN: &str = "dsn";
pub const ARG_TIMEOUT_MS: &str = "timeout-ms";
pub const ARG_INPUT: &str = "input";
pub const ARG_CLAIMS: &str = "claims";

#[must_use]
pub fn invoke_command() -> Command {
    Command::new(CMD_INVOKE)
        .about("Run one hook call and print the enforcement action or final claims")
        .arg(
            Arg::new(ARG_HOOK)
                .long(ARG_HOOK)
                .help("Hook point: mfa_verification_attempt, password_verification_attempt, custom_access_token")
                .env("PERMESI_HOOK_POINT")
                .required(true)
                .value_parser(|value: &str| value.parse::<HookPoint>()),
        )
        .arg(
            Arg::new(ARG_URI)
                .long(ARG_URI)
                .help("Hook URI, example: pg-functions://postgres/public/mfa_attempt or https://hooks.tld/mfa")
                .env("PERMESI_HOOK_URI")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SECRET)
                .long(ARG_SECRET)
                .help("Webhook signing secret (v1,whsec_<base64>), repeat or separate with '|'")
                .env("PERMESI_HOOK_SECRETS")
                .value_delimiter('|')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string, required for pg-functions hooks")
                .env("PERMESI_HOOKS_DSN"),
        )
        .arg(
            Arg::new(ARG_TIMEOUT_MS)
                .long(ARG_TIMEOUT_MS)
                .help("Hook call timeout in milliseconds")
                .default_value("2000")
                .env("PERMESI_HOOK_TIMEOUT_MS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_INPUT)
                .short('i')
                .long(ARG_INPUT)
                .help("Input envelope as JSON, or @path to read it from a file")
                .required(true),
        )
}

#[must_use]
pub fn check_claims_command() -> Command {
    Command::new(CMD_CHECK_CLAIMS)
        .about("Validate access token claims against the minimum token schema")
        .arg(
            Arg::new(ARG_CLAIMS)
                .short('c')
                .long(ARG_CLAIMS)
                .help("Claims as JSON, or @path to read them from a file")
                .required(true),
        )
}

#[derive(Debug)]
pub struct InvokeOptions {
    pub point: HookPoint,
    pub uri: String,
    pub secrets: Vec<String>,
    pub dsn: Option<String>,
    pub timeout: HookTimeout,
    pub input: String,
}

impl InvokeOptions {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let point = matches
            .get_one::<HookPoint>(ARG_HOOK)
            .copied()
            .context("missing required argument: --hook")?;
        let uri = matches
            .get_one::<String>(ARG_URI)
            .cloned()
            .context("missing required argument: --uri")?;
        let secrets = matches
            .get_many::<String>(ARG_SECRET)
            .map(|values| {
                values
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let timeout = matches
            .get_one::<u64>(ARG_TIMEOUT_MS)
            .copied()
            .map_or_else(HookTimeout::default, HookTimeout::from_millis);
        let input = matches
            .get_one::<String>(ARG_INPUT)
            .cloned()
            .context("missing required argument: --input")?;

        Ok(Self {
            point,
            uri,
            secrets,
            dsn: matches.get_one::<String>(ARG_DSN).cloned(),
            timeout,
            input,
        })
    }
}
