use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{
    models::PolicyEvaluator,
    types::{PolicyError, PolicyRequest, PolicyResult},
};

/// Verdict for a context key that is not set yet.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKey {
    #[default]
    Fail,
    /// Lets a re-evaluated binding survive planning and be decided later,
    /// once an earlier stage has written the key.
    Pass,
}

/// Passes when a plan context value matches a regular expression.
///
/// Non-string values are matched against their JSON rendering.
#[derive(Clone, Debug)]
pub struct ContextMatchPolicy {
    key: String,
    pattern: Regex,
    missing: MissingKey,
}

impl ContextMatchPolicy {
    /// # Errors
    /// Returns `PolicyError::Config` if `pattern` is not a valid regex.
    pub fn new(key: &str, pattern: &str) -> Result<Self, PolicyError> {
        let pattern = Regex::new(pattern)
            .map_err(|err| PolicyError::Config(format!("invalid pattern for {key}: {err}")))?;
        Ok(Self {
            key: key.to_string(),
            pattern,
            missing: MissingKey::default(),
        })
    }

    #[must_use]
    pub fn with_missing(mut self, missing: MissingKey) -> Self {
        self.missing = missing;
        self
    }
}

#[async_trait]
impl PolicyEvaluator for ContextMatchPolicy {
    async fn passes(&self, request: &PolicyRequest) -> Result<PolicyResult, PolicyError> {
        let Some(value) = request.context.get(&self.key) else {
            return Ok(match self.missing {
                MissingKey::Pass => PolicyResult::passing(),
                MissingKey::Fail => {
                    PolicyResult::failing(&format!("Context key {} is not set", self.key))
                }
            });
        };

        let haystack = match value {
            Value::String(value) => value.clone(),
            other => other.to_string(),
        };

        if self.pattern.is_match(&haystack) {
            Ok(PolicyResult::passing())
        } else {
            Ok(PolicyResult::failing(&format!(
                "Context key {} does not match",
                self.key
            )))
        }
    }
}
