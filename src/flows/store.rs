//! Read-only access to flow configuration.
//!
//! [`MemoryConfigStore`] is loaded from a JSON document:
//!
//! ```json
//! {
//!   "policies": [{ "name": "internal", "kind": "context_match", "key": "pending_user_identifier", "pattern": "@example\\.com$" }],
//!   "flows": [{
//!     "slug": "default-authentication",
//!     "designation": "authentication",
//!     "bindings": [
//!       { "order": 10, "stage": { "name": "identify", "kind": "identification" } },
//!       { "order": 20, "stage": { "name": "deny", "kind": "deny" },
//!         "re_evaluate_policies": true, "policies": [{ "policy": "internal", "negate": true }] }
//!     ]
//!   }]
//! }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::Path,
    sync::{PoisonError, RwLock},
    time::Duration,
};
use tracing::debug;
use uuid::Uuid;

use super::{
    error::StoreError,
    models::{default_background, Flow, FlowDesignation, FlowStageBinding, Stage},
};
use crate::policies::{Policy, PolicyBinding, PolicyDefinition, PolicyEngineMode};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn flow_by_slug(&self, slug: &str) -> Result<Option<Flow>, StoreError>;

    /// Bindings of `flow` sorted by `order`; ties keep configuration order.
    async fn bindings_for_flow(&self, flow: Uuid) -> Result<Vec<FlowStageBinding>, StoreError>;

    async fn binding(&self, pk: Uuid) -> Result<Option<FlowStageBinding>, StoreError>;

    /// Policy bindings attached to a flow or stage binding, sorted by `order`.
    async fn policies_for(&self, target: Uuid) -> Result<Vec<PolicyBinding>, StoreError>;
}

#[derive(Debug, Default)]
struct Inner {
    flows: Vec<Flow>,
    bindings: Vec<FlowStageBinding>,
    policy_bindings: Vec<PolicyBinding>,
}

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    inner: RwLock<Inner>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_flow(&self, flow: Flow) {
        self.write().flows.push(flow);
    }

    pub fn add_binding(&self, binding: FlowStageBinding) {
        self.write().bindings.push(binding);
    }

    pub fn remove_binding(&self, pk: Uuid) {
        let mut inner = self.write();
        inner.bindings.retain(|binding| binding.pk != pk);
        inner.policy_bindings.retain(|binding| binding.target != pk);
    }

    pub fn add_policy_binding(&self, binding: PolicyBinding) {
        self.write().policy_bindings.push(binding);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load flows, bindings and policies from a JSON document.
    ///
    /// # Errors
    /// Returns an error on malformed JSON, unknown policy names or invalid policies.
    pub fn from_json(json: &str, default_timeout: Duration) -> Result<Self, StoreError> {
        let document: Document = serde_json::from_str(json)?;

        let mut policies: HashMap<String, Policy> = HashMap::new();
        for definition in document.policies {
            let evaluator = definition
                .definition
                .build()
                .map_err(|err| StoreError::Config(format!("policy {}: {err}", definition.name)))?;
            let policy = Policy {
                pk: definition.pk.unwrap_or_else(Uuid::new_v4),
                name: definition.name.clone(),
                evaluator,
            };
            policies.insert(definition.name, policy);
        }

        let store = Self::new();
        for flow_document in document.flows {
            let flow = Flow {
                pk: flow_document.pk.unwrap_or_else(Uuid::new_v4),
                name: flow_document
                    .name
                    .unwrap_or_else(|| flow_document.slug.clone()),
                slug: flow_document.slug,
                title: flow_document.title,
                designation: flow_document.designation,
                background: flow_document.background.unwrap_or_else(default_background),
            };

            for reference in &flow_document.policies {
                store.add_policy_binding(reference.bind(flow.pk, &policies, default_timeout)?);
            }

            for binding_document in flow_document.bindings {
                let stage = Stage {
                    pk: binding_document.stage.pk.unwrap_or_else(Uuid::new_v4),
                    name: binding_document.stage.name,
                    kind: binding_document.stage.kind,
                    settings: binding_document.stage.settings,
                };
                let mut binding = FlowStageBinding::new(&flow, stage, binding_document.order)
                    .with_re_evaluate_policies(binding_document.re_evaluate_policies)
                    .with_policy_engine_mode(binding_document.policy_engine_mode);
                if let Some(pk) = binding_document.pk {
                    binding.pk = pk;
                }
                if let Some(limit) = binding_document.re_evaluate_on_failure_limit {
                    binding = binding.with_retry_limit(limit);
                }
                for reference in &binding_document.policies {
                    store.add_policy_binding(reference.bind(binding.pk, &policies, default_timeout)?);
                }
                store.add_binding(binding);
            }

            debug!("Loaded flow {}", flow.slug);
            store.add_flow(flow);
        }

        Ok(store)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path, default_timeout: Duration) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json, default_timeout)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn flow_by_slug(&self, slug: &str) -> Result<Option<Flow>, StoreError> {
        Ok(self.read().flows.iter().find(|flow| flow.slug == slug).cloned())
    }

    async fn bindings_for_flow(&self, flow: Uuid) -> Result<Vec<FlowStageBinding>, StoreError> {
        let mut bindings: Vec<FlowStageBinding> = self
            .read()
            .bindings
            .iter()
            .filter(|binding| binding.target == flow)
            .cloned()
            .collect();
        bindings.sort_by_key(|binding| binding.order);
        Ok(bindings)
    }

    async fn binding(&self, pk: Uuid) -> Result<Option<FlowStageBinding>, StoreError> {
        Ok(self.read().bindings.iter().find(|binding| binding.pk == pk).cloned())
    }

    async fn policies_for(&self, target: Uuid) -> Result<Vec<PolicyBinding>, StoreError> {
        let mut bindings: Vec<PolicyBinding> = self
            .read()
            .policy_bindings
            .iter()
            .filter(|binding| binding.target == target)
            .cloned()
            .collect();
        bindings.sort_by_key(|binding| binding.order);
        Ok(bindings)
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    policies: Vec<PolicyDocument>,
    #[serde(default)]
    flows: Vec<FlowDocument>,
}

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    pk: Option<Uuid>,
    name: String,
    #[serde(flatten)]
    definition: PolicyDefinition,
}

#[derive(Debug, Deserialize)]
struct FlowDocument {
    pk: Option<Uuid>,
    slug: String,
    name: Option<String>,
    #[serde(default)]
    title: String,
    designation: FlowDesignation,
    background: Option<String>,
    #[serde(default)]
    policies: Vec<PolicyReference>,
    #[serde(default)]
    bindings: Vec<BindingDocument>,
}

#[derive(Debug, Deserialize)]
struct StageDocument {
    pk: Option<Uuid>,
    name: String,
    kind: String,
    #[serde(default)]
    settings: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BindingDocument {
    pk: Option<Uuid>,
    #[serde(default)]
    order: i32,
    stage: StageDocument,
    #[serde(default)]
    re_evaluate_policies: bool,
    re_evaluate_on_failure_limit: Option<u32>,
    #[serde(default)]
    policy_engine_mode: PolicyEngineMode,
    #[serde(default)]
    policies: Vec<PolicyReference>,
}

#[derive(Debug, Deserialize)]
struct PolicyReference {
    policy: String,
    #[serde(default)]
    order: i32,
    #[serde(default = "enabled_default")]
    enabled: bool,
    #[serde(default)]
    negate: bool,
    timeout_seconds: Option<u64>,
}

const fn enabled_default() -> bool {
    true
}

impl PolicyReference {
    fn bind(
        &self,
        target: Uuid,
        policies: &HashMap<String, Policy>,
        default_timeout: Duration,
    ) -> Result<PolicyBinding, StoreError> {
        let policy = policies
            .get(&self.policy)
            .cloned()
            .ok_or_else(|| StoreError::Config(format!("unknown policy: {}", self.policy)))?;
        Ok(PolicyBinding::new(policy, target, self.order)
            .with_enabled(self.enabled)
            .with_negate(self.negate)
            .with_timeout(
                self.timeout_seconds
                    .map_or(default_timeout, Duration::from_secs),
            ))
    }
}
