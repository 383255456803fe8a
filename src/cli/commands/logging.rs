//! Log settings shared by every subcommand.
//!
//! Logs always go to stderr; stdout carries only the command's JSON report,
//! so `permesi-hooks invoke ... | jq` keeps working at any verbosity.

use clap::{builder::ValueParser, Arg, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_FORMAT: &str = "log-format";

const LEVELS: [Level; 5] = [
    Level::ERROR,
    Level::WARN,
    Level::INFO,
    Level::DEBUG,
    Level::TRACE,
];

/// Accepts a level name or its index in `error..=trace`.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        let index = level.parse::<usize>().ok().filter(|i| *i < LEVELS.len()).or_else(|| {
            LEVELS
                .iter()
                .position(|l| l.as_str().eq_ignore_ascii_case(level))
        });

        index
            .and_then(|i| u8::try_from(i).ok())
            .ok_or_else(|| format!("invalid log level: {level} (expected error, warn, info, debug or trace)"))
    })
}

/// Format of the stderr log stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// What `telemetry::init` needs from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::ERROR,
            format: LogFormat::Text,
        }
    }
}

impl LogSettings {
    /// Each `-v` raises the level by one step, saturating at TRACE.
    #[must_use]
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let verbosity = matches
            .get_one::<u8>(ARG_VERBOSITY)
            .copied()
            .map_or(0, usize::from);

        let format = match matches.get_one::<String>(ARG_LOG_FORMAT).map(String::as_str) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            level: LEVELS[verbosity.min(LEVELS.len() - 1)],
            format,
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("PERMESI_HOOKS_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long("log-format")
                .help("Format of the logs written to stderr")
                .env("PERMESI_HOOKS_LOG_FORMAT")
                .global(true)
                .value_parser(["text", "json"])
                .default_value("text"),
        )
}
