//! Anonymous session handling for the flow executor.
//!
//! The session id only keys the stored plan; it carries no identity.

use axum::{
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::Response,
};
use rand::{distributions::Alphanumeric, Rng};
use tracing::error;

pub const SESSION_COOKIE_NAME: &str = "authflow_session";
const SESSION_ID_LENGTH: usize = 32;

#[derive(Clone, Debug)]
pub struct FlowSession {
    id: String,
    is_new: bool,
}

impl FlowSession {
    /// Reuse the session from the request cookie, or mint a new one.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match extract_session_id(headers).filter(|id| valid_session_id(id)) {
            Some(id) => Self { id, is_new: false },
            None => Self {
                id: new_session_id(),
                is_new: true,
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Attach the session cookie to `response` when the session was just minted.
    pub fn apply(&self, response: &mut Response) {
        if !self.is_new {
            return;
        }
        match session_cookie(&self.id) {
            Ok(cookie) => {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build session cookie: {}", err),
        }
    }
}

fn session_cookie(id: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={id}; Path=/; HttpOnly; SameSite=Lax"
    ))
}

fn new_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LENGTH)
        .map(char::from)
        .collect()
}

fn valid_session_id(id: &str) -> bool {
    id.len() == SESSION_ID_LENGTH && id.chars().all(|c| c.is_ascii_alphanumeric())
}

fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}
