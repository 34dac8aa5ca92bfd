//! # Authflow
//!
//! `authflow` plans and executes multi-stage authentication flows.
//!
//! A **flow** is an ordered list of **stage bindings**. When a client first hits a
//! flow, the planner evaluates the flow's policies and every binding's policies
//! (concurrently, each with its own timeout) and produces a **plan**: the stages
//! that apply to this request, in order, each tagged with a marker that says how
//! the executor should treat it later.
//!
//! The plan lives in the client's session. Every request to the executor pops at
//! most one stage:
//!
//! - `GET` renders the current stage's challenge.
//! - `POST` validates a submission; on success the stage is removed and the
//!   client is sent back to the executor, or out of the flow once the plan is empty.
//!
//! Bindings flagged `re_evaluate_policies` are checked again right before they are
//! shown, against the context accumulated so far, and silently dropped if their
//! policies no longer pass.
//!
//! ## Storage
//!
//! Flows, bindings and policies are loaded from a JSON document at startup.
//! Sessions are kept in memory unless a `PostgreSQL` DSN is configured, in which
//! case plans are persisted in the `flow_sessions` table.

pub mod api;
pub mod cli;
pub mod flows;
pub mod policies;
pub mod stages;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_names_the_package() {
        assert!(APP_USER_AGENT.starts_with("authflow/"));
        assert!(APP_USER_AGENT.ends_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn commit_hash_is_never_empty() {
        assert!(!GIT_COMMIT_HASH.is_empty());
    }
}
