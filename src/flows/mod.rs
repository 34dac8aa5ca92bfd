//! Flow planning and execution.
//!
//! A [`FlowPlanner`](planner::FlowPlanner) turns a flow's configured stage
//! bindings into a [`FlowPlan`](plan::FlowPlan) for one request; the
//! [`FlowExecutor`](executor::FlowExecutor) walks that plan one stage per
//! request, keeping it in the session in between.

pub mod challenge;
pub mod config;
pub mod error;
pub mod executor;
pub mod markers;
pub mod models;
pub mod plan;
pub mod planner;
pub mod request;
pub mod session;
pub mod stage;
pub mod store;

pub use challenge::{Challenge, ChallengeType, FlowInfo};
pub use config::{FlowsConfig, PolicyEngineConfig};
pub use error::{FlowError, StoreError};
pub use executor::{FlowExecutor, FlowResponse, SESSION_KEY_PLAN};
pub use markers::StageMarker;
pub use models::{Flow, FlowDesignation, FlowStageBinding, Stage, User};
pub use plan::{FlowPlan, PlanContext};
pub use planner::FlowPlanner;
pub use request::{FlowMethod, FlowRequest};
pub use session::{MemorySessionStore, PgSessionStore, SessionStore};
pub use stage::{StageContext, StageRegistry, StageResult, StageView};
pub use store::{ConfigStore, MemoryConfigStore};
