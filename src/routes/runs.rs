use axum::{
    extract::{Json, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::enqueue_and_wake;
use crate::models::workflow_run::{NewWorkflowRun, RunStatus, TriggeredBy, WorkflowRun};
use crate::models::workflow_run_step::is_finished_step_status;
use crate::responses::JsonResponse;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// Processor-facing endpoints carry `Authorization: Bearer <PROCESSOR_SECRET>`.
/// With no secret configured they are closed.
fn require_processor(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(secret) = state.config.processor_secret.as_deref() else {
        return Err(
            JsonResponse::unauthorized("Processor access is not configured").into_response(),
        );
    };
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if provided.as_bytes().ct_eq(secret.as_bytes()).unwrap_u8() == 1 {
        Ok(())
    } else {
        let denied = JsonResponse::unauthorized("Invalid processor token");
        Err(denied.into_response())
    }
}

fn db_error(context: &str, err: sqlx::Error) -> Response {
    error!(?err, "{}", context);
    JsonResponse::server_error(context).into_response()
}

async fn run_view(state: &AppState, run: WorkflowRun) -> Response {
    match state.ledger.list_steps(run.id).await {
        Ok(steps) => (
            StatusCode::OK,
            Json(json!({ "success": true, "run": run, "steps": steps })),
        )
            .into_response(),
        Err(err) => db_error("Failed to load run steps", err),
    }
}

/// Polling endpoint: the latest ledger row plus its steps in start order.
pub async fn get_run_status(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Response {
    match state.ledger.get_run(run_id).await {
        Ok(Some(run)) => run_view(&state, run).await,
        Ok(None) => JsonResponse::not_found("Run not found").into_response(),
        Err(err) => db_error("Failed to load run", err),
    }
}

#[derive(Deserialize)]
pub struct FindRunQuery {
    pub idempotency_key: Option<String>,
}

pub async fn find_run(
    State(state): State<AppState>,
    Query(query): Query<FindRunQuery>,
) -> Response {
    let Some(key) = query.idempotency_key.filter(|k| !k.trim().is_empty()) else {
        return JsonResponse::bad_request("idempotency_key is required").into_response();
    };
    match state.ledger.find_run_by_key(key.trim()).await {
        Ok(Some(run)) => run_view(&state, run).await,
        Ok(None) => JsonResponse::not_found("Run not found").into_response(),
        Err(err) => db_error("Failed to load run", err),
    }
}

#[derive(Deserialize)]
pub struct TriggerRunRequest {
    pub workflow_name: String,
    pub entity_id: String,
    #[serde(default)]
    pub input: Option<Value>,
}

pub async fn trigger_run(
    State(state): State<AppState>,
    Json(payload): Json<TriggerRunRequest>,
) -> Response {
    if payload.workflow_name.trim().is_empty() || payload.entity_id.trim().is_empty() {
        return JsonResponse::bad_request("workflow_name and entity_id are required")
            .into_response();
    }
    let new_run = NewWorkflowRun::for_entity(
        &payload.workflow_name,
        &payload.entity_id,
        TriggeredBy::Manual,
        payload.input.unwrap_or_else(|| json!({})),
    );
    match enqueue_and_wake(state.ledger.as_ref(), state.waker.as_ref(), new_run).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "status": outcome.label(),
                "run": outcome.run(),
            })),
        )
            .into_response(),
        Err(err) => db_error("Failed to enqueue", err),
    }
}

#[derive(Deserialize)]
pub struct ListRunsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_runs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListRunsQuery>,
) -> Response {
    if let Err(resp) = require_processor(&state, &headers) {
        return resp;
    }
    let status = match query.status.as_deref() {
        None => RunStatus::Queued,
        Some(raw) => match RunStatus::parse(raw) {
            Some(status) => status,
            None => return JsonResponse::bad_request("Unknown run status").into_response(),
        },
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    match state.ledger.list_runs_by_status(status, limit).await {
        Ok(runs) => (
            StatusCode::OK,
            Json(json!({ "success": true, "runs": runs })),
        )
            .into_response(),
        Err(err) => db_error("Failed to list runs", err),
    }
}

/// 404 when the run does not exist, 409 when it exists but is in the wrong state.
async fn missing_or_conflict(state: &AppState, run_id: Uuid, conflict: &str) -> Response {
    match state.ledger.get_run(run_id).await {
        Ok(Some(_)) => JsonResponse::conflict(conflict).into_response(),
        Ok(None) => JsonResponse::not_found("Run not found").into_response(),
        Err(err) => db_error("Failed to load run", err),
    }
}

pub async fn claim_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<Uuid>,
) -> Response {
    if let Err(resp) = require_processor(&state, &headers) {
        return resp;
    }
    match state.ledger.claim_run(run_id).await {
        Ok(Some(run)) => {
            info!(%run_id, workflow = %run.workflow_name, "run claimed");
            (StatusCode::OK, Json(json!({ "success": true, "run": run }))).into_response()
        }
        Ok(None) => missing_or_conflict(&state, run_id, "Run is not queued").await,
        Err(err) => db_error("Failed to claim run", err),
    }
}

#[derive(Deserialize)]
pub struct StartStepRequest {
    pub step_name: String,
}

pub async fn start_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<Uuid>,
    Json(payload): Json<StartStepRequest>,
) -> Response {
    if let Err(resp) = require_processor(&state, &headers) {
        return resp;
    }
    if payload.step_name.trim().is_empty() {
        return JsonResponse::bad_request("step_name is required").into_response();
    }
    match state.ledger.get_run(run_id).await {
        Ok(Some(run)) if run.run_status() == Some(RunStatus::Running) => {}
        Ok(Some(_)) => return JsonResponse::conflict("Run is not running").into_response(),
        Ok(None) => return JsonResponse::not_found("Run not found").into_response(),
        Err(err) => return db_error("Failed to load run", err),
    }
    match state
        .ledger
        .start_step(run_id, payload.step_name.trim())
        .await
    {
        Ok(step) => (
            StatusCode::OK,
            Json(json!({ "success": true, "step": step })),
        )
            .into_response(),
        Err(err) => db_error("Failed to record step", err),
    }
}

#[derive(Deserialize)]
pub struct FinishStepRequest {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

pub async fn finish_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((run_id, step_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<FinishStepRequest>,
) -> Response {
    if let Err(resp) = require_processor(&state, &headers) {
        return resp;
    }
    if !is_finished_step_status(&payload.status) {
        return JsonResponse::bad_request("Step status must be success, failed or skipped")
            .into_response();
    }
    match state
        .ledger
        .finish_step(
            run_id,
            step_id,
            &payload.status,
            payload.error_message.as_deref(),
        )
        .await
    {
        Ok(Some(step)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "step": step })),
        )
            .into_response(),
        Ok(None) => JsonResponse::not_found("Step not found").into_response(),
        Err(err) => db_error("Failed to update step", err),
    }
}

#[derive(Deserialize)]
pub struct CompleteRunRequest {
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

pub async fn complete_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<Uuid>,
    Json(payload): Json<CompleteRunRequest>,
) -> Response {
    if let Err(resp) = require_processor(&state, &headers) {
        return resp;
    }
    let Some(status) = RunStatus::parse(&payload.status) else {
        return JsonResponse::bad_request("Unknown run status").into_response();
    };
    if !status.is_terminal() {
        return JsonResponse::conflict("Runs can only complete as success, failed or skipped")
            .into_response();
    }
    match state
        .ledger
        .complete_run(
            run_id,
            status,
            payload.output,
            payload.error_message.as_deref(),
        )
        .await
    {
        Ok(true) => {
            info!(%run_id, status = status.as_str(), "run finished");
            JsonResponse::success("Run completed").into_response()
        }
        Ok(false) => missing_or_conflict(&state, run_id, "Run is not running").await,
        Err(err) => db_error("Failed to complete run", err),
    }
}
