//! Configuration entities consumed by the planner and executor.
//!
//! These are read-only snapshots handed out by a [`ConfigStore`](super::store::ConfigStore).
//! Plans never hold them directly; they store binding ids and re-resolve them
//! on every request.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policies::PolicyEngineMode;

const DEFAULT_BACKGROUND: &str = "/static/flow-background.jpg";

/// What a flow is used for.
///
/// The planner records it in the plan context under `flow_designation`, so
/// policies (e.g. a `context_match` on that key) can restrict bindings to
/// flows of a given designation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDesignation {
    Authentication,
    Authorization,
    Invalidation,
    Enrollment,
    Unenrollment,
    Recovery,
    StageConfiguration,
}

impl FlowDesignation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Invalidation => "invalidation",
            Self::Enrollment => "enrollment",
            Self::Unenrollment => "unenrollment",
            Self::Recovery => "recovery",
            Self::StageConfiguration => "stage_configuration",
        }
    }
}

/// A named, ordered template of stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub pk: Uuid,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub designation: FlowDesignation,
    #[serde(default = "default_background")]
    pub background: String,
}

impl Flow {
    #[must_use]
    pub fn new(slug: &str, designation: FlowDesignation) -> Self {
        Self {
            pk: Uuid::new_v4(),
            slug: slug.to_string(),
            name: slug.to_string(),
            title: String::new(),
            designation,
            background: default_background(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }
}

pub(crate) fn default_background() -> String {
    DEFAULT_BACKGROUND.to_string()
}

/// A stage implementation instance; `kind` selects the registered stage view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub pk: Uuid,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl Stage {
    #[must_use]
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            pk: Uuid::new_v4(),
            name: name.to_string(),
            kind: kind.to_string(),
            settings: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    /// Read a string setting, if present.
    #[must_use]
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Attachment of a stage to a flow at a given order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowStageBinding {
    pub pk: Uuid,
    /// Owning flow.
    pub target: Uuid,
    pub stage: Stage,
    pub order: i32,
    /// Re-run this binding's policies right before the stage is presented.
    #[serde(default)]
    pub re_evaluate_policies: bool,
    /// Retry budget carried by the stage marker.
    #[serde(default)]
    pub re_evaluate_on_failure_limit: Option<u32>,
    #[serde(default)]
    pub policy_engine_mode: PolicyEngineMode,
}

impl FlowStageBinding {
    #[must_use]
    pub fn new(flow: &Flow, stage: Stage, order: i32) -> Self {
        Self {
            pk: Uuid::new_v4(),
            target: flow.pk,
            stage,
            order,
            re_evaluate_policies: false,
            re_evaluate_on_failure_limit: None,
            policy_engine_mode: PolicyEngineMode::All,
        }
    }

    #[must_use]
    pub fn with_re_evaluate_policies(mut self, re_evaluate: bool) -> Self {
        self.re_evaluate_policies = re_evaluate;
        self
    }

    #[must_use]
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.re_evaluate_on_failure_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_policy_engine_mode(mut self, mode: PolicyEngineMode) -> Self {
        self.policy_engine_mode = mode;
        self
    }
}

/// Identity going through a flow.
///
/// A user without `pk` is a display-only projection built from an identifier
/// that has not been resolved against persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub pk: Option<Uuid>,
    pub username: String,
    #[serde(default)]
    pub name: String,
}

impl User {
    #[must_use]
    pub fn new(username: &str) -> Self {
        Self {
            pk: Some(Uuid::new_v4()),
            username: username.to_string(),
            name: username.to_string(),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            pk: None,
            username: "AnonymousUser".to_string(),
            name: String::new(),
        }
    }

    #[must_use]
    pub fn display_only(identifier: &str) -> Self {
        Self {
            pk: None,
            username: identifier.to_string(),
            name: identifier.to_string(),
        }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.pk.is_none() && self.username == "AnonymousUser"
    }

    /// Stable key for per-user caches.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.pk
            .map_or_else(|| format!("anon:{}", self.username), |pk| pk.to_string())
    }
}
