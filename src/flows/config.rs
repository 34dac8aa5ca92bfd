use std::time::Duration;

const DEFAULT_REDIRECT: &str = "/";
const DEFAULT_CANCEL_URL: &str = "/flows/-/cancel";
const DEFAULT_POLICY_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_POLICY_GROUP_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_POLICY_CONCURRENCY: usize = 8;

/// Limits for one policy evaluation pass.
#[derive(Clone, Debug)]
pub struct PolicyEngineConfig {
    max_concurrency: usize,
    group_timeout: Duration,
    default_policy_timeout: Duration,
}

impl PolicyEngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_concurrency: DEFAULT_POLICY_CONCURRENCY,
            group_timeout: Duration::from_secs(DEFAULT_POLICY_GROUP_TIMEOUT_SECONDS),
            default_policy_timeout: Duration::from_secs(DEFAULT_POLICY_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_group_timeout(mut self, timeout: Duration) -> Self {
        self.group_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_default_policy_timeout(mut self, timeout: Duration) -> Self {
        self.default_policy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    #[must_use]
    pub fn group_timeout(&self) -> Duration {
        self.group_timeout
    }

    #[must_use]
    pub fn default_policy_timeout(&self) -> Duration {
        self.default_policy_timeout
    }
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings injected into the planner and executor.
#[derive(Clone, Debug)]
pub struct FlowsConfig {
    default_redirect: String,
    cancel_url: String,
    allow_empty_flows: bool,
    plan_cache_ttl_seconds: u64,
    policy: PolicyEngineConfig,
}

impl FlowsConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_redirect: DEFAULT_REDIRECT.to_string(),
            cancel_url: DEFAULT_CANCEL_URL.to_string(),
            allow_empty_flows: false,
            plan_cache_ttl_seconds: 0,
            policy: PolicyEngineConfig::new(),
        }
    }

    #[must_use]
    pub fn with_default_redirect(mut self, default_redirect: String) -> Self {
        self.default_redirect = default_redirect;
        self
    }

    #[must_use]
    pub fn with_cancel_url(mut self, cancel_url: String) -> Self {
        self.cancel_url = cancel_url;
        self
    }

    #[must_use]
    pub fn with_allow_empty_flows(mut self, allow: bool) -> Self {
        self.allow_empty_flows = allow;
        self
    }

    #[must_use]
    pub fn with_plan_cache_ttl_seconds(mut self, ttl: u64) -> Self {
        self.plan_cache_ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PolicyEngineConfig) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn default_redirect(&self) -> &str {
        &self.default_redirect
    }

    #[must_use]
    pub fn cancel_url(&self) -> &str {
        &self.cancel_url
    }

    #[must_use]
    pub fn allow_empty_flows(&self) -> bool {
        self.allow_empty_flows
    }

    #[must_use]
    pub fn plan_cache_ttl_seconds(&self) -> u64 {
        self.plan_cache_ttl_seconds
    }

    #[must_use]
    pub fn policy(&self) -> &PolicyEngineConfig {
        &self.policy
    }
}

impl Default for FlowsConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FlowsConfig::new();
        assert_eq!(config.default_redirect(), "/");
        assert_eq!(config.cancel_url(), "/flows/-/cancel");
        assert!(!config.allow_empty_flows());
        assert_eq!(config.plan_cache_ttl_seconds(), 0);
        assert_eq!(config.policy().max_concurrency(), 8);
        assert_eq!(config.policy().default_policy_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let policy = PolicyEngineConfig::new().with_max_concurrency(0);
        assert_eq!(policy.max_concurrency(), 1);
    }
}
