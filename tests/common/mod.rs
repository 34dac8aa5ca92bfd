#![allow(dead_code)]

use async_trait::async_trait;
use authflow::{
    flows::{
        session::decode_plan, ConfigStore, Flow, FlowDesignation, FlowExecutor, FlowPlan,
        FlowStageBinding, FlowsConfig, MemoryConfigStore, MemorySessionStore, SessionStore, Stage,
        StoreError, SESSION_KEY_PLAN,
    },
    policies::{Policy, PolicyBinding, PolicyError, PolicyEvaluator, PolicyRequest, PolicyResult},
    stages,
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

pub const SESSION: &str = "test-session";
pub const SLUG: &str = "test-flow";

/// Policy whose verdict can be flipped between requests.
#[derive(Clone, Debug)]
pub struct SwitchPolicy(Arc<AtomicBool>);

impl SwitchPolicy {
    pub fn new(passing: bool) -> Self {
        Self(Arc::new(AtomicBool::new(passing)))
    }

    pub fn set(&self, passing: bool) {
        self.0.store(passing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PolicyEvaluator for SwitchPolicy {
    async fn passes(&self, _request: &PolicyRequest) -> Result<PolicyResult, PolicyError> {
        if self.0.load(Ordering::SeqCst) {
            Ok(PolicyResult::passing())
        } else {
            Ok(PolicyResult::failing("switched off"))
        }
    }
}

/// Memory sessions that count deletions.
#[derive(Debug, Default)]
pub struct CountingSessions {
    inner: MemorySessionStore,
    deletes: AtomicUsize,
}

impl CountingSessions {
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for CountingSessions {
    async fn load(&self, session_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.load(session_id, key).await
    }

    async fn save(&self, session_id: &str, key: &str, payload: String) -> Result<(), StoreError> {
        self.inner.save(session_id, key, payload).await
    }

    async fn delete(&self, session_id: &str, key: &str) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(session_id, key).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryConfigStore>,
    pub sessions: Arc<CountingSessions>,
    pub flow: Flow,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryConfigStore::new());
        let flow = Flow::new(SLUG, FlowDesignation::Authentication);
        store.add_flow(flow.clone());
        Self {
            store,
            sessions: Arc::new(CountingSessions::default()),
            flow,
        }
    }

    /// Bind a stage of `kind` to the flow.
    pub fn stage(&self, name: &str, kind: &str, order: i32) -> FlowStageBinding {
        let binding = FlowStageBinding::new(&self.flow, Stage::new(name, kind), order);
        self.store.add_binding(binding.clone());
        binding
    }

    /// Bind a dummy stage that is re-evaluated against `policy` before it is shown.
    pub fn reevaluated(&self, name: &str, order: i32, policy: &SwitchPolicy) -> FlowStageBinding {
        let binding = FlowStageBinding::new(&self.flow, Stage::new(name, "dummy"), order)
            .with_re_evaluate_policies(true);
        self.store.add_binding(binding.clone());
        self.attach(binding.pk, policy);
        binding
    }

    /// Bind a stage of `kind` that tolerates `limit` failed submissions.
    pub fn retried(&self, name: &str, kind: &str, order: i32, limit: u32) -> FlowStageBinding {
        let binding =
            FlowStageBinding::new(&self.flow, Stage::new(name, kind), order).with_retry_limit(limit);
        self.store.add_binding(binding.clone());
        binding
    }

    pub fn attach(&self, target: uuid::Uuid, policy: &SwitchPolicy) {
        let policy = Policy::new("switch", Arc::new(policy.clone()));
        self.store
            .add_policy_binding(PolicyBinding::new(policy, target, 0));
    }

    pub fn executor(&self) -> FlowExecutor {
        self.executor_with(FlowsConfig::new())
    }

    pub fn executor_with(&self, config: FlowsConfig) -> FlowExecutor {
        let store: Arc<dyn ConfigStore> = self.store.clone();
        let sessions: Arc<dyn SessionStore> = self.sessions.clone();
        FlowExecutor::new(config, store, sessions, stages::registry())
    }

    /// Plan currently stored for [`SESSION`].
    pub async fn stored_plan(&self) -> Option<FlowPlan> {
        self.sessions
            .load(SESSION, SESSION_KEY_PLAN)
            .await
            .ok()
            .flatten()
            .as_deref()
            .and_then(decode_plan)
    }
}
