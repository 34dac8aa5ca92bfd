//! Policies decide whether a flow or a stage binding applies to a request.

pub mod context_match;
pub mod dummy;
pub mod engine;
pub mod models;
pub mod types;
pub mod webhook;

use serde::Deserialize;
use std::{sync::Arc, time::Duration};

pub use engine::{PolicyEngine, PolicyTarget};
pub use models::{Policy, PolicyBinding, PolicyEvaluator};
pub use types::{HttpRequestInfo, PolicyEngineMode, PolicyError, PolicyRequest, PolicyResult};

/// Declarative policy configuration, tagged by `kind`.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyDefinition {
    Dummy {
        #[serde(default)]
        result: bool,
        #[serde(default)]
        wait_min_ms: u64,
        #[serde(default)]
        wait_max_ms: u64,
    },
    ContextMatch {
        key: String,
        pattern: String,
        #[serde(default)]
        missing: context_match::MissingKey,
    },
    Webhook {
        url: String,
    },
}

impl PolicyDefinition {
    /// # Errors
    /// Returns an error if the definition cannot be turned into an evaluator.
    pub fn build(&self) -> Result<Arc<dyn PolicyEvaluator>, PolicyError> {
        Ok(match self {
            Self::Dummy {
                result,
                wait_min_ms,
                wait_max_ms,
            } => Arc::new(dummy::DummyPolicy::new(*result).with_wait(
                Duration::from_millis(*wait_min_ms),
                Duration::from_millis(*wait_max_ms),
            )),
            Self::ContextMatch {
                key,
                pattern,
                missing,
            } => Arc::new(
                context_match::ContextMatchPolicy::new(key, pattern)?.with_missing(*missing),
            ),
            Self::Webhook { url } => Arc::new(webhook::WebhookPolicy::new(url)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_parse_by_kind() {
        let definition: Result<PolicyDefinition, _> =
            serde_json::from_str(r#"{"kind": "context_match", "key": "k", "pattern": "^a"}"#);
        assert!(matches!(
            definition,
            Ok(PolicyDefinition::ContextMatch {
                ref key,
                missing: context_match::MissingKey::Fail,
                ..
            }) if key == "k"
        ));

        let lenient: Result<PolicyDefinition, _> = serde_json::from_str(
            r#"{"kind": "context_match", "key": "k", "pattern": "^a", "missing": "pass"}"#,
        );
        assert!(matches!(
            lenient,
            Ok(PolicyDefinition::ContextMatch {
                missing: context_match::MissingKey::Pass,
                ..
            })
        ));

        let dummy: Result<PolicyDefinition, _> = serde_json::from_str(r#"{"kind": "dummy"}"#);
        assert!(matches!(
            dummy,
            Ok(PolicyDefinition::Dummy { result: false, .. })
        ));
    }

    #[test]
    fn invalid_definitions_fail_to_build() {
        let definition = PolicyDefinition::ContextMatch {
            key: "k".to_string(),
            pattern: "(".to_string(),
            missing: context_match::MissingKey::default(),
        };
        assert!(definition.build().is_err());
    }
}
