use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::{models::User, plan::PlanContext, request::FlowRequest};

/// How the results of several policy bindings are combined.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEngineMode {
    /// Every binding must pass.
    #[default]
    All,
    /// At least one binding must pass.
    Any,
}

/// Request details policies may inspect.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HttpRequestInfo {
    pub path: String,
    pub remote_ip: Option<String>,
}

/// Immutable input shared by every policy in one evaluation pass.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PolicyRequest {
    pub user: User,
    pub context: PlanContext,
    pub http: Option<HttpRequestInfo>,
}

impl PolicyRequest {
    #[must_use]
    pub fn new(user: User) -> Self {
        Self {
            user,
            context: PlanContext::new(),
            http: None,
        }
    }

    /// Snapshot of `request` with the given plan context.
    #[must_use]
    pub fn from_flow_request(request: &FlowRequest, context: PlanContext) -> Self {
        Self {
            user: request.principal(),
            context,
            http: Some(HttpRequestInfo {
                path: request.path.clone(),
                remote_ip: request.remote_ip.clone(),
            }),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: PlanContext) -> Self {
        self.context = context;
        self
    }
}

/// Verdict of one policy, or of a whole target once aggregated.
///
/// `context` holds updates a passing policy wants applied to the plan context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub passing: bool,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub context: PlanContext,
}

impl PolicyResult {
    #[must_use]
    pub fn passing() -> Self {
        Self {
            passing: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            passing: false,
            messages: vec![message.to_string()],
            context: PlanContext::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
    #[error("policy request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid policy configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_result_is_failing() {
        let result = PolicyResult::default();
        assert!(!result.passing);
        assert!(result.messages.is_empty());
    }

    #[test]
    fn request_snapshot_uses_principal() {
        let request = FlowRequest::get("login", "sid").with_remote_ip("10.0.0.1");
        let snapshot = PolicyRequest::from_flow_request(&request, PlanContext::new());
        assert!(snapshot.user.is_anonymous());
        assert_eq!(
            snapshot.http.and_then(|http| http.remote_ip),
            Some("10.0.0.1".to_string())
        );
    }

    #[test]
    fn engine_mode_parses_lowercase() {
        let mode: Option<PolicyEngineMode> = serde_json::from_str("\"any\"").ok();
        assert_eq!(mode, Some(PolicyEngineMode::Any));
    }
}
