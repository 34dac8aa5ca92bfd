//! The session-scoped worklist of a flow in progress.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::markers::StageMarker;

pub const PLAN_CONTEXT_PENDING_USER: &str = "pending_user";
pub const PLAN_CONTEXT_PENDING_USER_IDENTIFIER: &str = "pending_user_identifier";
pub const PLAN_CONTEXT_REDIRECT: &str = "redirect";
pub const PLAN_CONTEXT_FLOW_SLUG: &str = "flow_slug";
pub const PLAN_CONTEXT_FLOW_DESIGNATION: &str = "flow_designation";

/// Shared key/value bag carried by a plan.
pub type PlanContext = serde_json::Map<String, Value>;

/// One queued step: a binding reference plus what to do before showing it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub binding: Uuid,
    pub marker: StageMarker,
}

/// Ordered queue of stage bindings plus the context they share.
///
/// Entries hold binding ids only; the executor re-resolves them against the
/// configuration store whenever a plan is loaded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowPlan {
    pub flow_pk: Uuid,
    entries: Vec<PlanEntry>,
    #[serde(default)]
    pub context: PlanContext,
}

impl FlowPlan {
    #[must_use]
    pub fn new(flow_pk: Uuid) -> Self {
        Self {
            flow_pk,
            entries: Vec::new(),
            context: PlanContext::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: PlanContext) -> Self {
        self.context = context;
        self
    }

    pub fn append(&mut self, binding: Uuid, marker: StageMarker) {
        self.entries.push(PlanEntry { binding, marker });
    }

    #[must_use]
    pub fn head(&self) -> Option<&PlanEntry> {
        self.entries.first()
    }

    pub fn head_mut(&mut self) -> Option<&mut PlanEntry> {
        self.entries.first_mut()
    }

    /// Remove and return the head entry.
    pub fn pop(&mut self) -> Option<PlanEntry> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite context keys with `updates`; keys not present are kept.
    pub fn merge_context(&mut self, updates: PlanContext) {
        for (key, value) in updates {
            self.context.insert(key, value);
        }
    }

    #[must_use]
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }
}
