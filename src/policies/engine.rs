//! Concurrent evaluation of policy bindings.
//!
//! One call to [`PolicyEngine::evaluate_many`] is one pass: every distinct
//! policy referenced by the given targets runs once on a bounded `JoinSet`,
//! each under its binding timeout, all under a group deadline. Errors,
//! panics and timeouts become failing results; nothing is propagated.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    models::{PolicyBinding, PolicyEvaluator},
    types::{PolicyEngineMode, PolicyRequest, PolicyResult},
};
use crate::flows::{config::PolicyEngineConfig, plan::PlanContext};

const INCOMPLETE_MESSAGE: &str = "Policy evaluation did not complete";

/// Policy bindings of one flow or stage binding, aggregated with `mode`.
#[derive(Clone, Debug)]
pub struct PolicyTarget {
    pub target: Uuid,
    pub mode: PolicyEngineMode,
    pub bindings: Vec<PolicyBinding>,
}

impl PolicyTarget {
    #[must_use]
    pub fn new(target: Uuid, mode: PolicyEngineMode, bindings: Vec<PolicyBinding>) -> Self {
        Self {
            target,
            mode,
            bindings,
        }
    }

    /// Enabled bindings in evaluation order; equal orders keep configuration order.
    fn active_bindings(&self) -> Vec<&PolicyBinding> {
        let mut active: Vec<&PolicyBinding> =
            self.bindings.iter().filter(|binding| binding.enabled).collect();
        active.sort_by_key(|binding| binding.order);
        active
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct CacheKey {
    policy: Uuid,
    user: String,
    context: String,
}

impl CacheKey {
    fn new(policy: Uuid, request: &PolicyRequest) -> Self {
        Self {
            policy,
            user: request.user.cache_key(),
            context: serde_json::to_string(&request.context).unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
pub struct PolicyEngine {
    config: PolicyEngineConfig,
    use_cache: bool,
    cache: Mutex<HashMap<CacheKey, PolicyResult>>,
}

impl PolicyEngine {
    #[must_use]
    pub fn new(config: PolicyEngineConfig) -> Self {
        Self {
            config,
            use_cache: true,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Keep results between passes of this engine; disable for re-evaluation.
    #[must_use]
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Evaluate a single target.
    pub async fn evaluate(&self, target: &PolicyTarget, request: Arc<PolicyRequest>) -> PolicyResult {
        self.evaluate_many(std::slice::from_ref(target), request)
            .await
            .pop()
            .unwrap_or_default()
    }

    /// Evaluate several targets in one pass; results are returned in `targets` order.
    pub async fn evaluate_many(
        &self,
        targets: &[PolicyTarget],
        request: Arc<PolicyRequest>,
    ) -> Vec<PolicyResult> {
        let mut results: HashMap<Uuid, PolicyResult> = HashMap::new();
        let mut scheduled: HashSet<Uuid> = HashSet::new();
        let mut jobs: Vec<(Uuid, Arc<dyn PolicyEvaluator>, Duration)> = Vec::new();

        for target in targets {
            for binding in target.active_bindings() {
                let pk = binding.policy.pk;
                if !scheduled.insert(pk) {
                    continue;
                }
                if let Some(cached) = self.cached(&CacheKey::new(pk, &request)) {
                    debug!(policy = %binding.policy.name, "policy result served from cache");
                    results.insert(pk, cached);
                    continue;
                }
                jobs.push((pk, binding.policy.evaluator.clone(), binding.timeout));
            }
        }

        if !jobs.is_empty() {
            self.run(jobs, &request, &mut results).await;
        }

        if self.use_cache {
            if let Ok(mut cache) = self.cache.lock() {
                for (pk, result) in &results {
                    cache.insert(CacheKey::new(*pk, &request), result.clone());
                }
            }
        }

        targets
            .iter()
            .map(|target| aggregate(target, &results))
            .collect()
    }

    fn cached(&self, key: &CacheKey) -> Option<PolicyResult> {
        if !self.use_cache {
            return None;
        }
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(key).cloned())
    }

    async fn run(
        &self,
        jobs: Vec<(Uuid, Arc<dyn PolicyEvaluator>, Duration)>,
        request: &Arc<PolicyRequest>,
        results: &mut HashMap<Uuid, PolicyResult>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency()));
        let mut set = JoinSet::new();

        for (pk, evaluator, policy_timeout) in jobs {
            let semaphore = semaphore.clone();
            let request = request.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = run_policy(pk, evaluator.as_ref(), &request, policy_timeout).await;
                (pk, result)
            });
        }

        let collect = async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((pk, result)) => {
                        results.insert(pk, result);
                    }
                    Err(err) => warn!("Policy task failed: {}", err),
                }
            }
        };

        let finished = timeout(self.config.group_timeout(), collect).await.is_ok();
        if !finished {
            warn!(
                "Policy evaluation exceeded group deadline of {:?}, aborting remaining policies",
                self.config.group_timeout()
            );
            set.abort_all();
        }
    }
}

async fn run_policy(
    pk: Uuid,
    evaluator: &dyn PolicyEvaluator,
    request: &PolicyRequest,
    policy_timeout: Duration,
) -> PolicyResult {
    match timeout(policy_timeout, evaluator.passes(request)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            warn!(policy = %pk, "Policy raised an error: {}", err);
            PolicyResult::failing(&err.to_string())
        }
        Err(_) => {
            warn!(policy = %pk, "Policy timed out after {:?}", policy_timeout);
            PolicyResult::failing("Policy timed out")
        }
    }
}

fn aggregate(target: &PolicyTarget, results: &HashMap<Uuid, PolicyResult>) -> PolicyResult {
    let bindings = target.active_bindings();
    if bindings.is_empty() {
        return PolicyResult::passing();
    }

    let mut verdicts = Vec::with_capacity(bindings.len());
    let mut messages = Vec::new();
    let mut context = PlanContext::new();

    for binding in bindings {
        let result = results
            .get(&binding.policy.pk)
            .cloned()
            .unwrap_or_else(|| PolicyResult::failing(INCOMPLETE_MESSAGE));
        let passing = result.passing != binding.negate;
        messages.extend(result.messages);
        if passing {
            for (key, value) in result.context {
                context.insert(key, value);
            }
        }
        verdicts.push(passing);
    }

    let passing = match target.mode {
        PolicyEngineMode::All => verdicts.iter().all(|passing| *passing),
        PolicyEngineMode::Any => verdicts.iter().any(|passing| *passing),
    };

    PolicyResult {
        passing,
        messages,
        context,
    }
}
