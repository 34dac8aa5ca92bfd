use axum::{
    body::Bytes,
    extract::{Extension, OriginalUri, Path, Query},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error};

use super::session::FlowSession;
use crate::flows::{
    executor::{FlowExecutor, FlowResponse},
    error::FlowError,
    models::User,
    request::{FlowMethod, FlowRequest},
};

#[utoipa::path(
    get,
    path = "/api/v1/flows/executor/{flow_slug}",
    params(
        ("flow_slug" = String, Path, description = "Slug of the flow to execute"),
        ("next" = Option<String>, Query, description = "Relative path to return to once the flow completes")
    ),
    responses(
        (status = 200, description = "Challenge for the current stage"),
        (status = 302, description = "Continue at the executor or leave the flow"),
        (status = 404, description = "Flow not found")
    ),
    tag = "flows"
)]
// axum handler for rendering the current stage
pub async fn executor_get(
    Path(flow_slug): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    executor: Extension<Arc<FlowExecutor>>,
) -> Response {
    let session = FlowSession::from_headers(&headers);
    let request = FlowRequest {
        method: FlowMethod::Get,
        flow_slug,
        session_id: session.id().to_string(),
        path: uri.path().to_string(),
        query,
        user: None,
        data: Value::Null,
        remote_ip: client_ip(&headers),
    };
    respond(&executor, &request, &session).await
}

#[utoipa::path(
    post,
    path = "/api/v1/flows/executor/{flow_slug}",
    params(
        ("flow_slug" = String, Path, description = "Slug of the flow to execute")
    ),
    request_body(
        content = serde_json::Value,
        content_type = "application/json",
        description = "Stage submission"
    ),
    responses(
        (status = 200, description = "Challenge, re-rendered with errors or redirecting out of the flow"),
        (status = 302, description = "Stage passed, continue at the executor or leave the flow"),
        (status = 400, description = "Body is not valid JSON"),
        (status = 404, description = "Flow not found")
    ),
    tag = "flows"
)]
// axum handler for stage submissions
pub async fn executor_post(
    Path(flow_slug): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    executor: Extension<Arc<FlowExecutor>>,
    body: Bytes,
) -> Response {
    let data = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(data) => data,
            Err(err) => {
                debug!("Invalid stage submission: {}", err);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid JSON body" })),
                )
                    .into_response();
            }
        }
    };

    let session = FlowSession::from_headers(&headers);
    let request = FlowRequest {
        method: FlowMethod::Post,
        flow_slug,
        session_id: session.id().to_string(),
        path: uri.path().to_string(),
        query,
        user: None,
        data,
        remote_ip: client_ip(&headers),
    };
    respond(&executor, &request, &session).await
}

#[utoipa::path(
    get,
    path = "/flows/-/cancel",
    responses(
        (status = 302, description = "Plan discarded, redirect to the default destination")
    ),
    tag = "flows"
)]
// axum handler for cancelling the current flow
pub async fn cancel(headers: HeaderMap, executor: Extension<Arc<FlowExecutor>>) -> Response {
    let session = FlowSession::from_headers(&headers);
    let mut response = match executor.cancel(session.id(), &User::anonymous()).await {
        Ok(()) => redirect(executor.config().default_redirect()),
        Err(err) => internal_error(&err),
    };
    session.apply(&mut response);
    response
}

async fn respond(executor: &FlowExecutor, request: &FlowRequest, session: &FlowSession) -> Response {
    let mut response = match executor.dispatch(request).await {
        Ok(FlowResponse::Challenge(challenge)) => (StatusCode::OK, Json(challenge)).into_response(),
        Ok(FlowResponse::Redirect { to }) => redirect(&to),
        Err(FlowError::FlowNotFound(slug)) => {
            debug!("Flow not found: {}", slug);
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("flow not found: {slug}") })),
            )
                .into_response()
        }
        Err(err) => internal_error(&err),
    };
    session.apply(&mut response);
    response
}

fn redirect(to: &str) -> Response {
    match HeaderValue::from_str(to) {
        Ok(location) => {
            let mut headers = HeaderMap::new();
            headers.insert(LOCATION, location);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(err) => {
            error!("Invalid redirect target {}: {}", to, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn internal_error(err: &FlowError) -> Response {
    error!("Flow execution failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}
