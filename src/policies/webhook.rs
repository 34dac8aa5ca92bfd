use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::{
    models::PolicyEvaluator,
    types::{PolicyError, PolicyRequest, PolicyResult},
};
use crate::{flows::plan::PlanContext, APP_USER_AGENT};

#[derive(Debug, Deserialize)]
struct Verdict {
    passing: bool,
    #[serde(default)]
    messages: Vec<String>,
    #[serde(default)]
    context: PlanContext,
}

/// Asks a remote endpoint for a verdict.
///
/// The policy request is POSTed as JSON. A 2xx response with an empty body
/// passes; a non-empty body must be a verdict object. Any other status fails.
#[derive(Clone, Debug)]
pub struct WebhookPolicy {
    url: Url,
    client: reqwest::Client,
}

impl WebhookPolicy {
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(url: &str) -> Result<Self, PolicyError> {
        let url = Url::parse(url)
            .map_err(|err| PolicyError::Config(format!("invalid webhook url {url}: {err}")))?;
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl PolicyEvaluator for WebhookPolicy {
    #[instrument(skip(self, request), fields(url = %self.url))]
    async fn passes(&self, request: &PolicyRequest) -> Result<PolicyResult, PolicyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        debug!("Webhook policy responded with {}", status);

        if !status.is_success() {
            return Ok(PolicyResult::failing(&format!(
                "Webhook responded with {status}"
            )));
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(PolicyResult::passing());
        }

        let verdict = serde_json::from_slice::<Verdict>(&body).map_err(|err| {
            PolicyError::Evaluation(format!("webhook returned an invalid verdict: {err}"))
        })?;
        Ok(PolicyResult {
            passing: verdict.passing,
            messages: verdict.messages,
            context: verdict.context,
        })
    }
}
