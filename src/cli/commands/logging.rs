//! Log level selection: a repeatable `-v` or a named `--log-level`.

use clap::{builder::PossibleValuesParser, Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_LEVEL: &str = "log-level";

const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Raise verbosity: -v WARN, -vv INFO, -vvv DEBUG, -vvvv TRACE (default: ERROR)")
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long("log-level")
                .help("Log level by name, takes precedence over -v")
                .env("AUTHFLOW_LOG_LEVEL")
                .global(true)
                .ignore_case(true)
                .value_parser(PossibleValuesParser::new(LEVEL_NAMES)),
        )
}

/// Level requested on the command line; `None` leaves the ERROR default.
#[must_use]
pub fn level(matches: &ArgMatches) -> Option<Level> {
    if let Some(name) = matches.get_one::<String>(ARG_LOG_LEVEL) {
        return name.parse().ok();
    }

    match matches.get_count(ARG_VERBOSITY) {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}
