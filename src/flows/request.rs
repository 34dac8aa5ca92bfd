//! Transport-neutral view of the request driving the executor.

use serde_json::Value;
use std::collections::BTreeMap;

use super::models::User;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlowMethod {
    Get,
    Post,
}

#[derive(Clone, Debug)]
pub struct FlowRequest {
    pub method: FlowMethod,
    pub flow_slug: String,
    pub session_id: String,
    /// Path of the executor endpoint, used to recognize redirects back to itself.
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Authenticated principal, if any.
    pub user: Option<User>,
    /// Submitted form data on POST.
    pub data: Value,
    pub remote_ip: Option<String>,
}

impl FlowRequest {
    #[must_use]
    pub fn get(flow_slug: &str, session_id: &str) -> Self {
        Self {
            method: FlowMethod::Get,
            flow_slug: flow_slug.to_string(),
            session_id: session_id.to_string(),
            path: format!("/api/v1/flows/executor/{flow_slug}"),
            query: BTreeMap::new(),
            user: None,
            data: Value::Null,
            remote_ip: None,
        }
    }

    #[must_use]
    pub fn post(flow_slug: &str, session_id: &str, data: Value) -> Self {
        Self {
            method: FlowMethod::Post,
            data,
            ..Self::get(flow_slug, session_id)
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn with_remote_ip(mut self, remote_ip: &str) -> Self {
        self.remote_ip = Some(remote_ip.to_string());
        self
    }

    /// Principal for policy evaluation and caching.
    #[must_use]
    pub fn principal(&self) -> User {
        self.user.clone().unwrap_or_else(User::anonymous)
    }

    /// Executor URL including the query string, used to send the client back here.
    #[must_use]
    pub fn full_path(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let mut url = url::Url::parse("http://localhost/").ok();
        if let Some(url) = url.as_mut() {
            url.set_path(&self.path);
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        url.map_or_else(
            || self.path.clone(),
            |url| format!("{}?{}", url.path(), url.query().unwrap_or_default()),
        )
    }
}
