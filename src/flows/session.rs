//! Session storage for in-progress plans.
//!
//! Plans are stored as a versioned JSON envelope. Anything that cannot be
//! decoded, including envelopes written by another version, reads as "no plan".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use super::{error::StoreError, plan::FlowPlan};

pub const PLAN_ENVELOPE_VERSION: u32 = 1;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str, key: &str) -> Result<Option<String>, StoreError>;

    async fn save(&self, session_id: &str, key: &str, payload: String) -> Result<(), StoreError>;

    /// Remove a key; removing a missing key is not an error.
    async fn delete(&self, session_id: &str, key: &str) -> Result<(), StoreError>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    plan: &'a FlowPlan,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    plan: Value,
}

/// # Errors
/// Returns an error if the plan cannot be serialized.
pub fn encode_plan(plan: &FlowPlan) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&EnvelopeRef {
        version: PLAN_ENVELOPE_VERSION,
        plan,
    })?)
}

#[must_use]
pub fn decode_plan(payload: &str) -> Option<FlowPlan> {
    let envelope: Envelope = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!("Discarding undecodable session plan: {}", err);
            return None;
        }
    };
    if envelope.version != PLAN_ENVELOPE_VERSION {
        warn!(
            "Discarding session plan with version {} (expected {})",
            envelope.version, PLAN_ENVELOPE_VERSION
        );
        return None;
    }
    serde_json::from_value(envelope.plan)
        .map_err(|err| warn!("Discarding malformed session plan: {}", err))
        .ok()
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&(session_id.to_string(), key.to_string()))
            .cloned())
    }

    async fn save(&self, session_id: &str, key: &str, payload: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert((session_id.to_string(), key.to_string()), payload);
        Ok(())
    }

    async fn delete(&self, session_id: &str, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.remove(&(session_id.to_string(), key.to_string()));
        Ok(())
    }
}

/// Sessions kept in the `flow_sessions` table.
#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the sessions table if it does not exist.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS flow_sessions (
                session_id TEXT NOT NULL,
                key TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (session_id, key)
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[instrument(skip(self))]
    async fn load(&self, session_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        let payload: Option<String> = sqlx::query_scalar(
            "SELECT payload FROM flow_sessions WHERE session_id = $1 AND key = $2",
        )
        .bind(session_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payload)
    }

    #[instrument(skip(self, payload))]
    async fn save(&self, session_id: &str, key: &str, payload: String) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO flow_sessions (session_id, key, payload, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (session_id, key)
            DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW()
            ",
        )
        .bind(session_id)
        .bind(key)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, session_id: &str, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM flow_sessions WHERE session_id = $1 AND key = $2")
            .bind(session_id)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
