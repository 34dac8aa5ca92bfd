use async_trait::async_trait;
use serde_json::Value;

use crate::flows::{
    challenge::Challenge,
    error::FlowError,
    stage::{StageContext, StageResult, StageView},
};

pub const KIND: &str = "dummy";
pub const COMPONENT: &str = "stage-dummy";

/// Shows a button and succeeds on any submission.
#[derive(Clone, Copy, Debug, Default)]
pub struct DummyStage;

#[async_trait]
impl StageView for DummyStage {
    async fn challenge(&self, _ctx: &StageContext<'_>) -> Result<Challenge, FlowError> {
        Ok(Challenge::native(COMPONENT))
    }

    async fn validate(&self, _ctx: &StageContext<'_>, _data: &Value) -> Result<StageResult, FlowError> {
        Ok(StageResult::success())
    }
}
