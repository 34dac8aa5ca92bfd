use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

use super::{
    models::PolicyEvaluator,
    types::{PolicyError, PolicyRequest, PolicyResult},
};

/// Returns a fixed verdict after a random wait, for testing flows and timeouts.
#[derive(Clone, Debug)]
pub struct DummyPolicy {
    result: bool,
    wait_min: Duration,
    wait_max: Duration,
}

impl DummyPolicy {
    #[must_use]
    pub fn new(result: bool) -> Self {
        Self {
            result,
            wait_min: Duration::ZERO,
            wait_max: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_wait(mut self, wait_min: Duration, wait_max: Duration) -> Self {
        self.wait_min = wait_min;
        self.wait_max = wait_max.max(wait_min);
        self
    }

    fn wait(&self) -> Duration {
        if self.wait_max <= self.wait_min {
            return self.wait_min;
        }
        rand::thread_rng().gen_range(self.wait_min..=self.wait_max)
    }
}

#[async_trait]
impl PolicyEvaluator for DummyPolicy {
    async fn passes(&self, _request: &PolicyRequest) -> Result<PolicyResult, PolicyError> {
        let wait = self.wait();
        if !wait.is_zero() {
            debug!("Dummy policy waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        Ok(PolicyResult {
            passing: self.result,
            messages: vec!["dummy".to_string()],
            ..PolicyResult::default()
        })
    }
}
