//! Builds plans and resolves their head entry.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    config::FlowsConfig,
    error::FlowError,
    markers::StageMarker,
    models::{Flow, FlowStageBinding, User},
    plan::{FlowPlan, PlanContext, PLAN_CONTEXT_FLOW_DESIGNATION, PLAN_CONTEXT_FLOW_SLUG},
    request::FlowRequest,
    store::ConfigStore,
};
use crate::policies::{PolicyEngine, PolicyEngineMode, PolicyRequest, PolicyTarget};

type PlanCacheKey = (Uuid, String);

/// Built plans per (flow, user), reused until `ttl` expires.
#[derive(Debug)]
struct PlanCache {
    ttl: Duration,
    entries: Mutex<HashMap<PlanCacheKey, (FlowPlan, Instant)>>,
}

impl PlanCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    fn get(&self, key: &PlanCacheKey) -> Option<FlowPlan> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some((plan, stored)) if stored.elapsed() < self.ttl => Some(plan.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: PlanCacheKey, plan: FlowPlan) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, (plan, Instant::now()));
    }

    fn evict(&self, key: &PlanCacheKey) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }
}

pub struct FlowPlanner {
    store: Arc<dyn ConfigStore>,
    config: FlowsConfig,
    cache: PlanCache,
}

impl FlowPlanner {
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>, config: FlowsConfig) -> Self {
        let cache = PlanCache::new(Duration::from_secs(config.plan_cache_ttl_seconds()));
        Self {
            store,
            config,
            cache,
        }
    }

    fn engine(&self) -> PolicyEngine {
        PolicyEngine::new(self.config.policy().clone())
    }

    /// Build a plan for `flow`.
    ///
    /// Flow-level policies are checked first and their context is merged
    /// into the plan context before any binding is evaluated. Each stage
    /// binding whose policies pass is queued with its marker; the rest are
    /// skipped.
    ///
    /// # Errors
    /// `NonApplicable` when the flow policies fail or no binding applies,
    /// `EmptyFlow` when the flow has no bindings and empty flows are not allowed.
    #[instrument(skip_all, fields(flow = %flow.slug))]
    pub async fn plan(
        &self,
        flow: &Flow,
        request: &FlowRequest,
        default_context: PlanContext,
    ) -> Result<FlowPlan, FlowError> {
        debug!("Starting planning process");
        let engine = self.engine();
        let user = request.principal();
        let use_cache = self.cache.enabled() && default_context.is_empty();

        let mut context = default_context;
        context.insert(PLAN_CONTEXT_FLOW_SLUG.to_string(), flow.slug.clone().into());
        context.insert(
            PLAN_CONTEXT_FLOW_DESIGNATION.to_string(),
            flow.designation.as_str().into(),
        );

        let flow_policies = self.store.policies_for(flow.pk).await?;
        let flow_result = engine
            .evaluate(
                &PolicyTarget::new(flow.pk, PolicyEngineMode::All, flow_policies),
                Arc::new(PolicyRequest::from_flow_request(request, context.clone())),
            )
            .await;
        if !flow_result.passing {
            debug!("Flow policies failed, flow not applicable");
            return Err(FlowError::NonApplicable {
                messages: flow_result.messages,
            });
        }
        for (key, value) in flow_result.context {
            context.insert(key, value);
        }

        let cache_key = (flow.pk, user.cache_key());
        if use_cache {
            if let Some(mut plan) = self.cache.get(&cache_key) {
                debug!("Using cached plan");
                plan.context = context;
                return Ok(plan);
            }
        }

        let snapshot = Arc::new(PolicyRequest::from_flow_request(request, context.clone()));
        let plan = self.build_plan(flow, &engine, snapshot, context).await?;
        if use_cache {
            self.cache.put(cache_key, plan.clone());
        }
        Ok(plan)
    }

    async fn build_plan(
        &self,
        flow: &Flow,
        engine: &PolicyEngine,
        snapshot: Arc<PolicyRequest>,
        context: PlanContext,
    ) -> Result<FlowPlan, FlowError> {
        let mut plan = FlowPlan::new(flow.pk).with_context(context);
        let bindings = self.store.bindings_for_flow(flow.pk).await?;

        if bindings.is_empty() {
            if self.config.allow_empty_flows() {
                debug!("Flow has no stages, returning empty plan");
                return Ok(plan);
            }
            return Err(FlowError::EmptyFlow);
        }

        let mut targets = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let policies = self.store.policies_for(binding.pk).await?;
            targets.push(PolicyTarget::new(
                binding.pk,
                binding.policy_engine_mode,
                policies,
            ));
        }
        let results = engine.evaluate_many(&targets, snapshot).await;

        let mut messages = Vec::new();
        for (binding, result) in bindings.iter().zip(results) {
            if !result.passing {
                debug!(stage = %binding.stage.name, "Stage binding does not apply, skipping");
                messages.extend(result.messages);
                continue;
            }
            plan.merge_context(result.context);
            let marker = StageMarker::for_binding(binding);
            debug!(stage = %binding.stage.name, ?marker, "Stage binding applies");
            plan.append(binding.pk, marker);
        }

        if plan.is_empty() {
            return Err(FlowError::NonApplicable { messages });
        }

        debug!(stages = plan.len(), "Finished planning");
        Ok(plan)
    }

    /// Resolve the binding at the head of `plan`.
    ///
    /// `Reevaluate` entries re-run their binding's policies against the
    /// current plan context: a pass turns the entry `Plain`, a failure removes
    /// it and moves on to the next entry. Returns `None` once the queue is empty.
    ///
    /// # Errors
    /// Returns an error if a queued binding no longer exists or the store fails.
    pub async fn next(
        &self,
        plan: &mut FlowPlan,
        request: &FlowRequest,
    ) -> Result<Option<FlowStageBinding>, FlowError> {
        let engine = self.engine().with_cache(false);

        while let Some(entry) = plan.head().cloned() {
            let binding = self
                .store
                .binding(entry.binding)
                .await?
                .ok_or(FlowError::BindingNotFound(entry.binding))?;

            match entry.marker {
                StageMarker::Plain | StageMarker::Retry { .. } => return Ok(Some(binding)),
                StageMarker::Reevaluate => {
                    let policies = self.store.policies_for(binding.pk).await?;
                    let snapshot = Arc::new(PolicyRequest::from_flow_request(
                        request,
                        plan.context.clone(),
                    ));
                    let result = engine
                        .evaluate(
                            &PolicyTarget::new(binding.pk, binding.policy_engine_mode, policies),
                            snapshot,
                        )
                        .await;

                    if result.passing {
                        debug!(stage = %binding.stage.name, "Re-evaluation passed");
                        plan.merge_context(result.context);
                        if let Some(head) = plan.head_mut() {
                            head.marker = StageMarker::Plain;
                        }
                        return Ok(Some(binding));
                    }

                    debug!(stage = %binding.stage.name, "Re-evaluation failed, removing stage");
                    plan.pop();
                }
            }
        }

        Ok(None)
    }

    /// Drop the cached plan of `user` for `flow_pk`.
    pub fn evict(&self, flow_pk: Uuid, user: &User) {
        self.cache.evict(&(flow_pk, user.cache_key()));
    }
}
