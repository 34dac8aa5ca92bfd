//! Request-level state machine driving a flow across GET/POST round trips.
//!
//! Each request reloads the plan from the session store, resolves the head
//! entry (re-evaluating policies where marked) and hands the request to the
//! bound stage. The plan is written back after planning, after a successful
//! submission pops an entry and after a failed submission spends retry budget.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    challenge::{Challenge, FlowInfo},
    config::FlowsConfig,
    error::{FlowError, NON_APPLICABLE_MESSAGE},
    markers::StageMarker,
    models::{Flow, User},
    plan::{FlowPlan, PlanContext, PLAN_CONTEXT_REDIRECT},
    planner::FlowPlanner,
    request::{FlowMethod, FlowRequest},
    session::{decode_plan, encode_plan, SessionStore},
    stage::{pending_user, StageContext, StageRegistry, StageResult},
    store::ConfigStore,
};

pub const SESSION_KEY_PLAN: &str = "authflow_plan";
pub const NEXT_ARG_NAME: &str = "next";
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "Too many failed attempts.";

/// What the transport layer should send back.
#[derive(Clone, Debug, PartialEq)]
pub enum FlowResponse {
    /// Rendered as a 200 JSON body.
    Challenge(Challenge),
    /// Rendered as a 302 to `to`.
    Redirect { to: String },
}

impl FlowResponse {
    fn redirect(to: &str) -> Self {
        Self::Redirect { to: to.to_string() }
    }
}

pub struct FlowExecutor {
    config: FlowsConfig,
    store: Arc<dyn ConfigStore>,
    sessions: Arc<dyn SessionStore>,
    stages: StageRegistry,
    planner: FlowPlanner,
}

impl FlowExecutor {
    #[must_use]
    pub fn new(
        config: FlowsConfig,
        store: Arc<dyn ConfigStore>,
        sessions: Arc<dyn SessionStore>,
        stages: StageRegistry,
    ) -> Self {
        let planner = FlowPlanner::new(store.clone(), config.clone());
        Self {
            config,
            store,
            sessions,
            stages,
            planner,
        }
    }

    #[must_use]
    pub fn config(&self) -> &FlowsConfig {
        &self.config
    }

    /// Handle one executor request.
    ///
    /// # Errors
    /// `FlowNotFound` for unknown slugs; store failures, unknown stage kinds
    /// and stage faults are returned as-is. Expected outcomes (non-applicable
    /// flows, empty flows, invalid submissions) are responses, not errors.
    #[instrument(skip_all, fields(flow = %request.flow_slug, method = ?request.method))]
    pub async fn dispatch(&self, request: &FlowRequest) -> Result<FlowResponse, FlowError> {
        let flow = self
            .store
            .flow_by_slug(&request.flow_slug)
            .await?
            .ok_or_else(|| FlowError::FlowNotFound(request.flow_slug.clone()))?;

        let mut plan = match self.load_plan(&flow, request).await? {
            Some(plan) => plan,
            None => match self.initiate_plan(&flow, request).await {
                Ok(plan) => plan,
                Err(FlowError::NonApplicable { messages }) => {
                    debug!(?messages, "Flow not applicable to current user");
                    return Ok(FlowResponse::Challenge(
                        Challenge::access_denied(NON_APPLICABLE_MESSAGE)
                            .with_flow_info(self.flow_info(&flow)),
                    ));
                }
                Err(FlowError::EmptyFlow) => {
                    debug!("Flow is empty, redirecting to default");
                    return Ok(FlowResponse::redirect(self.config.default_redirect()));
                }
                Err(err) => return Err(err),
            },
        };

        if plan.is_empty() {
            return self.flow_done(&flow, &plan, request).await;
        }

        let Some(binding) = self.planner.next(&mut plan, request).await? else {
            debug!("No stages left after re-evaluation");
            return self.flow_done(&flow, &plan, request).await;
        };
        let marker = plan.head().map_or(StageMarker::Plain, |entry| entry.marker);
        let view = self.stages.get(&binding.stage.kind)?;
        debug!(stage = %binding.stage.name, ?marker, "Dispatching to stage");

        let ctx = StageContext {
            flow: &flow,
            binding: &binding,
            plan: &plan,
            request,
            marker,
        };

        let response = match request.method {
            FlowMethod::Get => {
                let challenge = view.challenge(&ctx).await?;
                FlowResponse::Challenge(self.decorate(&flow, challenge))
            }
            FlowMethod::Post => {
                let outcome = view.validate(&ctx, &request.data).await?;
                match outcome {
                    StageResult::Success { context } => {
                        self.stage_ok(&flow, plan, request, context).await?
                    }
                    StageResult::Failure { errors } => {
                        debug!(stage = %binding.stage.name, "Stage validation failed");
                        let Some(next_marker) = marker.after_failure() else {
                            warn!(
                                stage = %binding.stage.name,
                                "Retry budget exhausted, cancelling plan"
                            );
                            self.cancel_plan(
                                &request.session_id,
                                Some(flow.pk),
                                &request.principal(),
                            )
                            .await?;
                            return Ok(FlowResponse::Challenge(
                                Challenge::access_denied(RETRIES_EXHAUSTED_MESSAGE)
                                    .with_flow_info(self.flow_info(&flow)),
                            ));
                        };
                        let challenge = view.challenge(&ctx).await?.with_errors(errors);
                        if next_marker != marker {
                            if let Some(head) = plan.head_mut() {
                                head.marker = next_marker;
                            }
                            self.save_plan(&request.session_id, &plan).await?;
                        }
                        FlowResponse::Challenge(self.decorate(&flow, challenge))
                    }
                }
            }
        };

        Ok(to_stage_response(request, response))
    }

    /// Drop the plan stored for `session_id`, if any.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub async fn cancel(&self, session_id: &str, user: &User) -> Result<(), FlowError> {
        let stored = self.sessions.load(session_id, SESSION_KEY_PLAN).await?;
        let flow_pk = stored
            .as_deref()
            .and_then(decode_plan)
            .map(|plan| plan.flow_pk);
        self.cancel_plan(session_id, flow_pk, user).await
    }

    async fn cancel_plan(
        &self,
        session_id: &str,
        flow_pk: Option<Uuid>,
        user: &User,
    ) -> Result<(), FlowError> {
        if let Some(flow_pk) = flow_pk {
            self.planner.evict(flow_pk, user);
        }
        self.sessions.delete(session_id, SESSION_KEY_PLAN).await?;
        debug!("Cancelled flow plan");
        Ok(())
    }

    /// Load the session plan, discarding it if it belongs to another flow or
    /// references bindings that no longer exist.
    async fn load_plan(
        &self,
        flow: &Flow,
        request: &FlowRequest,
    ) -> Result<Option<FlowPlan>, FlowError> {
        let Some(payload) = self
            .sessions
            .load(&request.session_id, SESSION_KEY_PLAN)
            .await?
        else {
            return Ok(None);
        };
        let Some(plan) = decode_plan(&payload) else {
            return Ok(None);
        };

        if plan.flow_pk != flow.pk {
            warn!("Found existing plan for other flow, deleting plan");
            self.cancel_plan(&request.session_id, Some(plan.flow_pk), &request.principal())
                .await?;
            return Ok(None);
        }

        for entry in plan.entries() {
            let current = self.store.binding(entry.binding).await?;
            if current.map_or(true, |binding| binding.target != flow.pk) {
                warn!(binding = %entry.binding, "Plan references a missing stage binding, deleting plan");
                self.cancel_plan(&request.session_id, Some(plan.flow_pk), &request.principal())
                    .await?;
                return Ok(None);
            }
        }

        debug!(stages = plan.len(), "Continuing existing plan");
        Ok(Some(plan))
    }

    async fn initiate_plan(
        &self,
        flow: &Flow,
        request: &FlowRequest,
    ) -> Result<FlowPlan, FlowError> {
        let mut default_context = PlanContext::new();
        if let Some(next) = request.query.get(NEXT_ARG_NAME) {
            if is_safe_redirect(next) {
                default_context.insert(PLAN_CONTEXT_REDIRECT.to_string(), next.clone().into());
            } else {
                warn!(next = %next, "Ignoring unsafe redirect target");
            }
        }

        let plan = self.planner.plan(flow, request, default_context).await?;
        if !plan.is_empty() {
            self.save_plan(&request.session_id, &plan).await?;
        }
        Ok(plan)
    }

    async fn save_plan(&self, session_id: &str, plan: &FlowPlan) -> Result<(), FlowError> {
        self.sessions
            .save(session_id, SESSION_KEY_PLAN, encode_plan(plan)?)
            .await?;
        Ok(())
    }

    async fn stage_ok(
        &self,
        flow: &Flow,
        mut plan: FlowPlan,
        request: &FlowRequest,
        context: PlanContext,
    ) -> Result<FlowResponse, FlowError> {
        plan.merge_context(context);
        plan.pop();

        if plan.is_empty() {
            return self.flow_done(flow, &plan, request).await;
        }

        self.save_plan(&request.session_id, &plan).await?;
        debug!(remaining = plan.len(), "Continuing with next stage");
        Ok(FlowResponse::Redirect {
            to: request.full_path(),
        })
    }

    async fn flow_done(
        &self,
        flow: &Flow,
        plan: &FlowPlan,
        request: &FlowRequest,
    ) -> Result<FlowResponse, FlowError> {
        self.cancel_plan(&request.session_id, Some(flow.pk), &request.principal())
            .await?;

        let user = pending_user(plan, request, true);
        let to = plan
            .context_str(PLAN_CONTEXT_REDIRECT)
            .unwrap_or_else(|| self.config.default_redirect())
            .to_string();
        info!(flow = %flow.slug, user = %user.username, redirect = %to, "Flow completed");
        Ok(FlowResponse::Redirect { to })
    }

    fn flow_info(&self, flow: &Flow) -> FlowInfo {
        FlowInfo {
            background: flow.background.clone(),
            cancel_url: self.config.cancel_url().to_string(),
            title: flow.title.clone(),
        }
    }

    fn decorate(&self, flow: &Flow, challenge: Challenge) -> Challenge {
        if challenge.flow_info.is_some() {
            challenge
        } else {
            challenge.with_flow_info(self.flow_info(flow))
        }
    }
}

/// Turn redirects leaving the executor into `flow-redirect` challenges.
///
/// A redirect back to the executor itself stays a plain redirect.
#[must_use]
pub fn to_stage_response(request: &FlowRequest, response: FlowResponse) -> FlowResponse {
    match response {
        FlowResponse::Redirect { to } => {
            let path = to.split('?').next().unwrap_or_default();
            if path == request.path {
                FlowResponse::Redirect { to }
            } else {
                FlowResponse::Challenge(Challenge::redirect(&to))
            }
        }
        challenge @ FlowResponse::Challenge(_) => challenge,
    }
}

/// Only same-origin absolute paths are accepted as post-flow targets.
fn is_safe_redirect(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}
