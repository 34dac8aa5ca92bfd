use async_trait::async_trait;
use serde_json::{json, Value};

use crate::flows::{
    challenge::{Challenge, ErrorDetail, ResponseErrors},
    error::FlowError,
    plan::{PlanContext, PLAN_CONTEXT_PENDING_USER_IDENTIFIER},
    stage::{StageContext, StageResult, StageView},
};

pub const KIND: &str = "identification";

const UID_FIELD: &str = "uid_field";

/// Asks for an identifier and records it as the pending user identifier.
///
/// The identifier is not resolved against any user database; later stages
/// and policies see it through the plan context.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentificationStage;

#[async_trait]
impl StageView for IdentificationStage {
    async fn challenge(&self, ctx: &StageContext<'_>) -> Result<Challenge, FlowError> {
        let user_fields = ctx
            .binding
            .stage
            .settings
            .get("user_fields")
            .cloned()
            .unwrap_or_else(|| json!(["username"]));
        let pending = ctx.pending_user(true);

        let mut challenge =
            Challenge::native("stage-identification").with_field("user_fields", user_fields);
        if !pending.is_anonymous() {
            challenge = challenge.with_field("pending_user", pending.username.into());
        }
        Ok(challenge)
    }

    async fn validate(&self, _ctx: &StageContext<'_>, data: &Value) -> Result<StageResult, FlowError> {
        let identifier = data
            .get(UID_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();

        if identifier.is_empty() {
            let mut errors = ResponseErrors::new();
            errors.insert(
                UID_FIELD.to_string(),
                vec![ErrorDetail::new("This field is required.", "required")],
            );
            return Ok(StageResult::Failure { errors });
        }

        let mut context = PlanContext::new();
        context.insert(
            PLAN_CONTEXT_PENDING_USER_IDENTIFIER.to_string(),
            identifier.into(),
        );
        Ok(StageResult::Success { context })
    }
}
