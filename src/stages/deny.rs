use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::flows::{
    challenge::{Challenge, ErrorDetail, ResponseErrors},
    error::FlowError,
    stage::{StageContext, StageResult, StageView},
};

pub const KIND: &str = "deny";

const DEFAULT_MESSAGE: &str = "Access denied";

/// Stops the flow: shows an access-denied challenge and rejects every submission.
///
/// Usually bound with policies so it only applies to some users.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenyStage;

fn message<'a>(ctx: &'a StageContext<'_>) -> &'a str {
    ctx.binding
        .stage
        .setting_str("message")
        .unwrap_or(DEFAULT_MESSAGE)
}

#[async_trait]
impl StageView for DenyStage {
    async fn challenge(&self, ctx: &StageContext<'_>) -> Result<Challenge, FlowError> {
        let user = ctx.pending_user(true);
        debug!(user = %user.username, "Denying access");
        Ok(Challenge::access_denied(message(ctx)))
    }

    async fn validate(&self, ctx: &StageContext<'_>, _data: &Value) -> Result<StageResult, FlowError> {
        let mut errors = ResponseErrors::new();
        errors.insert(
            "non_field_errors".to_string(),
            vec![ErrorDetail::new(message(ctx), "denied")],
        );
        Ok(StageResult::Failure { errors })
    }
}
