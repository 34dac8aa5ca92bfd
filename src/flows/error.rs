//! Error taxonomy for flow planning and execution.
//!
//! `NonApplicable` and `EmptyFlow` are expected outcomes that the executor
//! turns into regular responses (an access-denied challenge and a redirect).
//! Everything else is an internal fault surfaced to the caller.

use thiserror::Error;
use uuid::Uuid;

/// Message shown in the access-denied challenge.
pub const NON_APPLICABLE_MESSAGE: &str = "Flow does not apply to current user (denied by policy).";

#[derive(Debug, Error)]
pub enum FlowError {
    /// No stage in this flow applies to the current user or request.
    #[error("Flow does not apply to current user (denied by policy).")]
    NonApplicable { messages: Vec<String> },
    /// The flow has no stage bindings at all.
    #[error("flow has no stages")]
    EmptyFlow,
    #[error("flow not found: {0}")]
    FlowNotFound(String),
    #[error("stage binding not found: {0}")]
    BindingNotFound(Uuid),
    #[error("no stage handler registered for kind `{0}`")]
    UnknownStage(String),
    #[error("stage failed: {0}")]
    Stage(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of the configuration and session stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}
