//! Challenge payloads returned to the client for the current stage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const COMPONENT_ACCESS_DENIED: &str = "access-denied";
pub const COMPONENT_FLOW_REDIRECT: &str = "flow-redirect";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeType {
    Native,
    Redirect,
    Shell,
}

/// Presentation details for the flow shown alongside every challenge.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FlowInfo {
    pub background: String,
    pub cancel_url: String,
    pub title: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub string: String,
    pub code: String,
}

impl ErrorDetail {
    #[must_use]
    pub fn new(string: &str, code: &str) -> Self {
        Self {
            string: string.to_string(),
            code: code.to_string(),
        }
    }
}

/// Field name to list of validation errors.
pub type ResponseErrors = BTreeMap<String, Vec<ErrorDetail>>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_info: Option<FlowInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_errors: Option<ResponseErrors>,
    /// Stage specific fields, flattened into the payload.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Challenge {
    #[must_use]
    pub fn native(component: &str) -> Self {
        Self {
            challenge_type: ChallengeType::Native,
            component: component.to_string(),
            flow_info: None,
            error_message: None,
            to: None,
            response_errors: None,
            extra: BTreeMap::new(),
        }
    }

    /// Client-side redirect to a location outside the executor.
    #[must_use]
    pub fn redirect(to: &str) -> Self {
        let mut challenge = Self::native(COMPONENT_FLOW_REDIRECT);
        challenge.challenge_type = ChallengeType::Redirect;
        challenge.to = Some(to.to_string());
        challenge
    }

    #[must_use]
    pub fn access_denied(message: &str) -> Self {
        let mut challenge = Self::native(COMPONENT_ACCESS_DENIED);
        challenge.error_message = Some(message.to_string());
        challenge
    }

    #[must_use]
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_flow_info(mut self, flow_info: FlowInfo) -> Self {
        self.flow_info = Some(flow_info);
        self
    }

    #[must_use]
    pub fn with_errors(mut self, errors: ResponseErrors) -> Self {
        self.response_errors = Some(errors);
        self
    }
}
