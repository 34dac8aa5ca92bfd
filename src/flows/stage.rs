//! Contract between the executor and stage implementations.

use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

use super::{
    challenge::{Challenge, ResponseErrors},
    error::FlowError,
    markers::StageMarker,
    models::{Flow, FlowStageBinding, User},
    plan::{FlowPlan, PlanContext, PLAN_CONTEXT_PENDING_USER, PLAN_CONTEXT_PENDING_USER_IDENTIFIER},
    request::FlowRequest,
};

/// Outcome of a submission.
#[derive(Clone, Debug, PartialEq)]
pub enum StageResult {
    /// The stage is done; `context` is merged into the plan.
    Success { context: PlanContext },
    /// Invalid input; the same challenge is shown again with these errors.
    Failure { errors: ResponseErrors },
}

impl StageResult {
    #[must_use]
    pub fn success() -> Self {
        Self::Success {
            context: PlanContext::new(),
        }
    }
}

/// Everything a stage may look at while handling one request.
pub struct StageContext<'a> {
    pub flow: &'a Flow,
    pub binding: &'a FlowStageBinding,
    pub plan: &'a FlowPlan,
    pub request: &'a FlowRequest,
    pub marker: StageMarker,
}

impl StageContext<'_> {
    #[must_use]
    pub fn pending_user(&self, for_display: bool) -> User {
        pending_user(self.plan, self.request, for_display)
    }
}

/// Resolve the user a flow is acting for.
///
/// Order: `pending_user` from the context, then (display only) the
/// `pending_user_identifier` projection, then the request principal, then
/// the anonymous user. Nothing here touches persistence.
#[must_use]
pub fn pending_user(plan: &FlowPlan, request: &FlowRequest, for_display: bool) -> User {
    if let Some(user) = plan
        .context
        .get(PLAN_CONTEXT_PENDING_USER)
        .and_then(|value| serde_json::from_value::<User>(value.clone()).ok())
    {
        return user;
    }
    if for_display {
        if let Some(identifier) = plan.context_str(PLAN_CONTEXT_PENDING_USER_IDENTIFIER) {
            return User::display_only(identifier);
        }
    }
    request.principal()
}

/// A stage implementation.
#[async_trait]
pub trait StageView: Send + Sync {
    /// Challenge presented on GET.
    async fn challenge(&self, ctx: &StageContext<'_>) -> Result<Challenge, FlowError>;

    /// Validate submitted data on POST.
    async fn validate(&self, ctx: &StageContext<'_>, data: &Value)
        -> Result<StageResult, FlowError>;
}

/// Stage implementations keyed by `Stage::kind`.
#[derive(Clone, Default)]
pub struct StageRegistry {
    views: HashMap<String, Arc<dyn StageView>>,
}

impl StageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, kind: &str, view: Arc<dyn StageView>) -> Self {
        self.views.insert(kind.to_string(), view);
        self
    }

    /// # Errors
    /// Returns `FlowError::UnknownStage` when nothing is registered for `kind`.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn StageView>, FlowError> {
        self.views
            .get(kind)
            .cloned()
            .ok_or_else(|| FlowError::UnknownStage(kind.to_string()))
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.views.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
