use clap::{Arg, Command};

pub const ARG_FLOWS: &str = "flows";
pub const ARG_DEFAULT_REDIRECT: &str = "default-redirect";
pub const ARG_PLAN_CACHE_TTL: &str = "plan-cache-ttl";
pub const ARG_POLICY_TIMEOUT_MS: &str = "policy-timeout-ms";
pub const ARG_POLICY_CONCURRENCY: &str = "policy-concurrency";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FLOWS)
                .short('f')
                .long("flows")
                .help("Path to the JSON document describing flows, stages and policies")
                .env("AUTHFLOW_FLOWS")
                .required(true),
        )
        .arg(
            Arg::new(ARG_DEFAULT_REDIRECT)
                .long("default-redirect")
                .help("Where clients go when a flow completes without a `next` target")
                .default_value("/")
                .env("AUTHFLOW_DEFAULT_REDIRECT"),
        )
        .arg(
            Arg::new(ARG_PLAN_CACHE_TTL)
                .long("plan-cache-ttl")
                .help("Seconds to cache computed plans per flow and user, 0 disables the cache")
                .default_value("0")
                .env("AUTHFLOW_PLAN_CACHE_TTL")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_POLICY_TIMEOUT_MS)
                .long("policy-timeout-ms")
                .help("Default timeout in milliseconds for a single policy evaluation")
                .default_value("30000")
                .env("AUTHFLOW_POLICY_TIMEOUT_MS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_POLICY_CONCURRENCY)
                .long("policy-concurrency")
                .help("Maximum number of policies evaluated at the same time")
                .default_value("8")
                .env("AUTHFLOW_POLICY_CONCURRENCY")
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
}
