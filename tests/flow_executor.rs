mod common;

use anyhow::{Context, Result};
use authflow::flows::{
    error::NON_APPLICABLE_MESSAGE,
    executor::RETRIES_EXHAUSTED_MESSAGE,
    plan::PLAN_CONTEXT_PENDING_USER_IDENTIFIER,
    session::encode_plan,
    Challenge, Flow, FlowDesignation, FlowError, FlowPlan, FlowRequest, FlowResponse,
    FlowsConfig, SessionStore, StageMarker, User, SESSION_KEY_PLAN,
};
use common::{Harness, SwitchPolicy, SESSION, SLUG};
use serde_json::json;

const EXECUTOR_PATH: &str = "/api/v1/flows/executor/test-flow";

fn get() -> FlowRequest {
    FlowRequest::get(SLUG, SESSION)
}

fn post(data: serde_json::Value) -> FlowRequest {
    FlowRequest::post(SLUG, SESSION, data)
}

fn back_to_executor() -> FlowResponse {
    FlowResponse::Redirect {
        to: EXECUTOR_PATH.to_string(),
    }
}

fn flow_info(harness: &Harness) -> serde_json::Value {
    json!({
        "background": harness.flow.background,
        "cancel_url": "/flows/-/cancel",
        "title": "",
    })
}

fn challenge_json(response: &FlowResponse) -> Result<serde_json::Value> {
    match response {
        FlowResponse::Challenge(challenge) => Ok(serde_json::to_value(challenge)?),
        FlowResponse::Redirect { to } => anyhow::bail!("expected a challenge, got redirect to {to}"),
    }
}

#[tokio::test]
async fn empty_flow_redirects_to_default() -> Result<()> {
    let harness = Harness::new();
    let executor = harness.executor();

    let response = executor.dispatch(&get().with_query("next", "/somewhere")).await?;
    assert_eq!(
        response,
        FlowResponse::Redirect {
            to: "/".to_string()
        }
    );
    assert!(harness.stored_plan().await.is_none());
    Ok(())
}

#[tokio::test]
async fn allowed_empty_flow_completes_immediately() -> Result<()> {
    let harness = Harness::new();
    let executor = harness.executor_with(FlowsConfig::new().with_allow_empty_flows(true));

    let response = executor.dispatch(&get().with_query("next", "/after")).await?;
    assert_eq!(
        response,
        FlowResponse::Redirect {
            to: "/after".to_string()
        }
    );
    assert!(harness.stored_plan().await.is_none());
    Ok(())
}

#[tokio::test]
async fn non_applicable_flow_is_access_denied() -> Result<()> {
    let harness = Harness::new();
    harness.stage("first", "dummy", 0);
    harness.attach(harness.flow.pk, &SwitchPolicy::new(false));
    let executor = harness.executor();

    let response = executor.dispatch(&get()).await?;
    assert_eq!(
        challenge_json(&response)?,
        json!({
            "component": "access-denied",
            "error_message": NON_APPLICABLE_MESSAGE,
            "flow_info": flow_info(&harness),
            "type": "native",
        })
    );
    assert!(harness.stored_plan().await.is_none());
    Ok(())
}

#[tokio::test]
async fn no_applicable_stage_is_access_denied() -> Result<()> {
    let harness = Harness::new();
    let binding = harness.stage("first", "dummy", 0);
    harness.attach(binding.pk, &SwitchPolicy::new(false));
    let executor = harness.executor();

    let response = executor.dispatch(&get()).await?;
    let body = challenge_json(&response)?;
    assert_eq!(body["component"], "access-denied");
    assert_eq!(body["error_message"], NON_APPLICABLE_MESSAGE);
    Ok(())
}

#[tokio::test]
async fn unknown_flow_is_an_error() -> Result<()> {
    let harness = Harness::new();
    let executor = harness.executor();

    let result = executor
        .dispatch(&FlowRequest::get("does-not-exist", SESSION))
        .await;
    assert!(matches!(result, Err(FlowError::FlowNotFound(slug)) if slug == "does-not-exist"));
    Ok(())
}

#[tokio::test]
async fn unknown_stage_kind_is_an_error() -> Result<()> {
    let harness = Harness::new();
    harness.stage("mystery", "does-not-exist", 0);
    let executor = harness.executor();

    let result = executor.dispatch(&get()).await;
    assert!(matches!(result, Err(FlowError::UnknownStage(kind)) if kind == "does-not-exist"));
    Ok(())
}

#[tokio::test]
async fn get_renders_first_stage() -> Result<()> {
    let harness = Harness::new();
    harness.stage("first", "dummy", 0);
    harness.stage("second", "dummy", 1);
    let executor = harness.executor();

    let response = executor.dispatch(&get()).await?;
    assert_eq!(
        challenge_json(&response)?,
        json!({
            "type": "native",
            "component": "stage-dummy",
            "flow_info": flow_info(&harness),
        })
    );

    let plan = harness.stored_plan().await.context("plan was not stored")?;
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.context_str("flow_slug"), Some(SLUG));
    Ok(())
}

#[tokio::test]
async fn stale_plan_for_other_flow_is_replaced() -> Result<()> {
    let harness = Harness::new();
    harness.stage("first", "dummy", 0);
    let other = Flow::new("other-flow", FlowDesignation::Authentication);
    let mut stale = FlowPlan::new(other.pk);
    stale.append(uuid::Uuid::new_v4(), StageMarker::Plain);
    harness
        .sessions
        .save(SESSION, SESSION_KEY_PLAN, encode_plan(&stale)?)
        .await?;
    let executor = harness.executor();

    let response = executor.dispatch(&get()).await?;
    assert_eq!(challenge_json(&response)?["component"], "stage-dummy");
    assert_eq!(harness.sessions.deletes(), 1);

    let plan = harness.stored_plan().await.context("plan was not rebuilt")?;
    assert_eq!(plan.flow_pk, harness.flow.pk);
    Ok(())
}

#[tokio::test]
async fn plan_with_removed_binding_is_replaced() -> Result<()> {
    let harness = Harness::new();
    let first = harness.stage("first", "dummy", 0);
    harness.stage("second", "dummy", 1);
    let executor = harness.executor();

    executor.dispatch(&get()).await?;
    harness.store.remove_binding(first.pk);

    let response = executor.dispatch(&get()).await?;
    assert_eq!(challenge_json(&response)?["component"], "stage-dummy");
    assert_eq!(harness.sessions.deletes(), 1);
    let plan = harness.stored_plan().await.context("plan was not rebuilt")?;
    assert_eq!(plan.len(), 1);
    Ok(())
}

#[tokio::test]
async fn undecodable_session_payload_is_ignored() -> Result<()> {
    let harness = Harness::new();
    harness.stage("first", "dummy", 0);
    harness
        .sessions
        .save(SESSION, SESSION_KEY_PLAN, "not a plan".to_string())
        .await?;
    harness
        .sessions
        .save("old-session", SESSION_KEY_PLAN, json!({"version": 0, "plan": {}}).to_string())
        .await?;
    let executor = harness.executor();

    let response = executor.dispatch(&get()).await?;
    assert_eq!(challenge_json(&response)?["component"], "stage-dummy");
    assert_eq!(harness.sessions.deletes(), 0);
    assert!(harness.stored_plan().await.is_some());

    let response = executor
        .dispatch(&FlowRequest::get(SLUG, "old-session"))
        .await?;
    assert_eq!(challenge_json(&response)?["component"], "stage-dummy");
    Ok(())
}

#[tokio::test]
async fn successful_stage_returns_to_executor() -> Result<()> {
    let harness = Harness::new();
    harness.stage("first", "dummy", 0);
    let second = harness.stage("second", "dummy", 1);
    let executor = harness.executor();

    let response = executor.dispatch(&post(json!({}))).await?;
    assert_eq!(response, back_to_executor());

    let plan = harness.stored_plan().await.context("plan was not stored")?;
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.head().map(|entry| entry.binding), Some(second.pk));
    Ok(())
}

#[tokio::test]
async fn redirect_back_keeps_query() -> Result<()> {
    let harness = Harness::new();
    harness.stage("first", "dummy", 0);
    harness.stage("second", "dummy", 1);
    let executor = harness.executor();

    let response = executor
        .dispatch(&post(json!({})).with_query("next", "/if/user/"))
        .await?;
    assert_eq!(
        response,
        FlowResponse::Redirect {
            to: format!("{EXECUTOR_PATH}?next=%2Fif%2Fuser%2F")
        }
    );
    Ok(())
}

#[tokio::test]
async fn last_stage_completion_redirects_out_of_flow() -> Result<()> {
    let harness = Harness::new();
    harness.stage("only", "dummy", 0);
    let executor = harness.executor();

    let response = executor
        .dispatch(&post(json!({})).with_query("next", "/if/user/"))
        .await?;
    assert_eq!(
        response,
        FlowResponse::Challenge(Challenge::redirect("/if/user/"))
    );
    assert_eq!(
        challenge_json(&response)?,
        json!({ "component": "flow-redirect", "to": "/if/user/", "type": "redirect" })
    );
    assert!(harness.stored_plan().await.is_none());
    Ok(())
}

#[tokio::test]
async fn unsafe_next_is_ignored() -> Result<()> {
    let harness = Harness::new();
    harness.stage("only", "dummy", 0);
    let executor = harness.executor();

    let response = executor
        .dispatch(&post(json!({})).with_query("next", "//evil.example"))
        .await?;
    assert_eq!(response, FlowResponse::Challenge(Challenge::redirect("/")));
    Ok(())
}

#[tokio::test]
async fn reevaluation_removes_last_stage() -> Result<()> {
    let harness = Harness::new();
    let switch = SwitchPolicy::new(true);
    harness.stage("first", "dummy", 0);
    harness.reevaluated("second", 1, &switch);
    let executor = harness.executor();

    assert_eq!(executor.dispatch(&post(json!({}))).await?, back_to_executor());
    let plan = harness.stored_plan().await.context("plan was not stored")?;
    assert_eq!(plan.head().map(|entry| entry.marker), Some(StageMarker::Reevaluate));

    switch.set(false);
    let response = executor.dispatch(&post(json!({}))).await?;
    assert_eq!(
        response,
        FlowResponse::Redirect {
            to: "/".to_string()
        }
    );
    assert!(harness.stored_plan().await.is_none());
    Ok(())
}

#[tokio::test]
async fn reevaluation_removes_middle_stage() -> Result<()> {
    let harness = Harness::new();
    let switch = SwitchPolicy::new(true);
    harness.stage("first", "dummy", 0);
    harness.reevaluated("second", 1, &switch);
    harness.stage("third", "dummy", 2);
    let executor = harness.executor();

    assert_eq!(executor.dispatch(&post(json!({}))).await?, back_to_executor());

    switch.set(false);
    let response = executor.dispatch(&post(json!({}))).await?;
    assert_eq!(
        challenge_json(&response)?,
        json!({ "component": "flow-redirect", "to": "/", "type": "redirect" })
    );
    assert!(harness.stored_plan().await.is_none());
    Ok(())
}

#[tokio::test]
async fn reevaluation_keeps_passing_stage() -> Result<()> {
    let harness = Harness::new();
    let switch = SwitchPolicy::new(true);
    harness.stage("first", "dummy", 0);
    let second = harness.reevaluated("second", 1, &switch);
    let executor = harness.executor();

    assert_eq!(executor.dispatch(&post(json!({}))).await?, back_to_executor());

    let response = executor.dispatch(&get()).await?;
    assert_eq!(challenge_json(&response)?["component"], "stage-dummy");
    let plan = harness.stored_plan().await.context("plan was not stored")?;
    assert_eq!(plan.head().map(|entry| entry.binding), Some(second.pk));

    let response = executor.dispatch(&post(json!({}))).await?;
    assert_eq!(response, FlowResponse::Challenge(Challenge::redirect("/")));
    Ok(())
}

#[tokio::test]
async fn reevaluation_removes_consecutive_stages() -> Result<()> {
    let harness = Harness::new();
    let second_switch = SwitchPolicy::new(true);
    let third_switch = SwitchPolicy::new(true);
    harness.stage("first", "dummy", 0);
    harness.reevaluated("second", 1, &second_switch);
    harness.reevaluated("third", 2, &third_switch);
    harness.stage("fourth", "dummy", 3);
    let executor = harness.executor();

    assert_eq!(executor.dispatch(&post(json!({}))).await?, back_to_executor());

    second_switch.set(false);
    third_switch.set(false);

    let response = executor.dispatch(&get()).await?;
    assert_eq!(
        challenge_json(&response)?,
        json!({
            "type": "native",
            "component": "stage-dummy",
            "flow_info": flow_info(&harness),
        })
    );
    // GET does not write the pruned plan back
    let plan = harness.stored_plan().await.context("plan was not stored")?;
    assert_eq!(plan.len(), 3);

    let response = executor.dispatch(&post(json!({}))).await?;
    assert_eq!(response, FlowResponse::Challenge(Challenge::redirect("/")));
    assert!(harness.stored_plan().await.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_validation_leaves_plan_untouched() -> Result<()> {
    let harness = Harness::new();
    harness.stage("identify", "identification", 0);
    let executor = harness.executor();

    let response = executor.dispatch(&post(json!({}))).await?;
    let body = challenge_json(&response)?;
    assert_eq!(body["component"], "stage-identification");
    assert_eq!(body["response_errors"]["uid_field"][0]["code"], "required");
    assert_eq!(body["flow_info"], flow_info(&harness));

    let plan = harness.stored_plan().await.context("plan was not stored")?;
    assert_eq!(plan.len(), 1);
    assert!(plan
        .context
        .get(PLAN_CONTEXT_PENDING_USER_IDENTIFIER)
        .is_none());
    Ok(())
}

#[tokio::test]
async fn failed_submissions_spend_retry_budget() -> Result<()> {
    let harness = Harness::new();
    harness.retried("identify", "identification", 0, 1);
    harness.stage("confirm", "dummy", 1);
    let executor = harness.executor();

    let response = executor.dispatch(&post(json!({}))).await?;
    assert_eq!(challenge_json(&response)?["component"], "stage-identification");
    let plan = harness.stored_plan().await.context("plan was not stored")?;
    assert_eq!(
        plan.head().map(|entry| entry.marker),
        Some(StageMarker::Retry { remaining: 0 })
    );

    let response = executor.dispatch(&post(json!({}))).await?;
    let body = challenge_json(&response)?;
    assert_eq!(body["component"], "access-denied");
    assert_eq!(body["error_message"], RETRIES_EXHAUSTED_MESSAGE);
    assert!(harness.stored_plan().await.is_none());
    assert_eq!(harness.sessions.deletes(), 1);
    Ok(())
}

#[tokio::test]
async fn pending_identifier_is_shown_to_later_stages() -> Result<()> {
    let harness = Harness::new();
    harness.stage("identify", "identification", 0);
    harness.stage("confirm", "identification", 1);
    let executor = harness.executor();

    let response = executor
        .dispatch(&post(json!({ "uid_field": "alice@example.com" })))
        .await?;
    assert_eq!(response, back_to_executor());

    let body = challenge_json(&executor.dispatch(&get()).await?)?;
    assert_eq!(body["pending_user"], "alice@example.com");

    let plan = harness.stored_plan().await.context("plan was not stored")?;
    assert_eq!(
        plan.context_str(PLAN_CONTEXT_PENDING_USER_IDENTIFIER),
        Some("alice@example.com")
    );
    Ok(())
}

#[tokio::test]
async fn deny_stage_never_advances() -> Result<()> {
    let harness = Harness::new();
    harness.stage("deny", "deny", 0);
    let executor = harness.executor();

    let response = executor.dispatch(&post(json!({}))).await?;
    let body = challenge_json(&response)?;
    assert_eq!(body["component"], "access-denied");
    assert!(body["response_errors"].is_object());
    assert_eq!(
        harness.stored_plan().await.map(|plan| plan.len()),
        Some(1)
    );
    Ok(())
}

#[tokio::test]
async fn cancel_discards_plan() -> Result<()> {
    let harness = Harness::new();
    harness.stage("first", "dummy", 0);
    let executor = harness.executor();

    executor.dispatch(&get()).await?;
    assert!(harness.stored_plan().await.is_some());

    executor.cancel(SESSION, &User::anonymous()).await?;
    assert!(harness.stored_plan().await.is_none());
    assert_eq!(harness.sessions.deletes(), 1);
    Ok(())
}
