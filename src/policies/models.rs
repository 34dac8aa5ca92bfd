use async_trait::async_trait;
use std::{fmt, sync::Arc, time::Duration};
use uuid::Uuid;

use super::types::{PolicyError, PolicyRequest, PolicyResult};

/// A policy implementation.
///
/// Implementations only read the request; context changes go into the
/// returned [`PolicyResult`].
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn passes(&self, request: &PolicyRequest) -> Result<PolicyResult, PolicyError>;
}

#[derive(Clone)]
pub struct Policy {
    pub pk: Uuid,
    pub name: String,
    pub evaluator: Arc<dyn PolicyEvaluator>,
}

impl Policy {
    #[must_use]
    pub fn new(name: &str, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self {
            pk: Uuid::new_v4(),
            name: name.to_string(),
            evaluator,
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("pk", &self.pk)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Attachment of a policy to a flow or a stage binding.
#[derive(Clone, Debug)]
pub struct PolicyBinding {
    pub pk: Uuid,
    pub policy: Policy,
    /// Pk of the flow or stage binding this applies to.
    pub target: Uuid,
    pub order: i32,
    pub enabled: bool,
    pub negate: bool,
    pub timeout: Duration,
}

impl PolicyBinding {
    #[must_use]
    pub fn new(policy: Policy, target: Uuid, order: i32) -> Self {
        Self {
            pk: Uuid::new_v4(),
            policy,
            target,
            order,
            enabled: true,
            negate: false,
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_negate(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
