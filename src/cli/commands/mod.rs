mod flows;
mod logging;

pub use self::flows::{
    ARG_DEFAULT_REDIRECT, ARG_FLOWS, ARG_PLAN_CACHE_TTL, ARG_POLICY_CONCURRENCY,
    ARG_POLICY_TIMEOUT_MS,
};
pub use self::logging::{level as log_level, ARG_LOG_LEVEL, ARG_VERBOSITY};

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("authflow")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("AUTHFLOW_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .long_help(
                    "Database connection string. When set, in-progress plans are stored in PostgreSQL instead of memory.",
                )
                .env("AUTHFLOW_DSN"),
        );

    let command = flows::with_args(command);
    logging::with_args(command)
}
