use crate::cli::{
    actions::{server::Args, Action},
    commands::{
        ARG_DEFAULT_REDIRECT, ARG_FLOWS, ARG_PLAN_CACHE_TTL, ARG_POLICY_CONCURRENCY,
        ARG_POLICY_TIMEOUT_MS,
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let flows = matches
        .get_one::<String>(ARG_FLOWS)
        .map(PathBuf::from)
        .context("missing required argument: --flows")?;
    let dsn = matches
        .get_one::<String>("dsn")
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| SecretString::from(dsn.clone()));

    let default_redirect = matches
        .get_one::<String>(ARG_DEFAULT_REDIRECT)
        .cloned()
        .unwrap_or_else(|| "/".to_string());
    if !default_redirect.starts_with('/') {
        anyhow::bail!("--default-redirect must be a relative path starting with '/'");
    }

    let plan_cache_ttl = matches
        .get_one::<u64>(ARG_PLAN_CACHE_TTL)
        .copied()
        .unwrap_or(0);
    let policy_timeout = Duration::from_millis(
        matches
            .get_one::<u64>(ARG_POLICY_TIMEOUT_MS)
            .copied()
            .unwrap_or(30_000),
    );
    let policy_concurrency = matches
        .get_one::<u16>(ARG_POLICY_CONCURRENCY)
        .copied()
        .map_or(8, usize::from);

    Ok(Action::Server(Args {
        port,
        flows,
        dsn,
        default_redirect,
        plan_cache_ttl,
        policy_timeout,
        policy_concurrency,
    }))
}
