use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::engine::enqueue_and_wake;
use crate::models::synced_task::UpsertOutcome;
use crate::models::workflow_run::{NewWorkflowRun, TriggeredBy};
use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::sync::TaskEventOutcome;
use crate::utils::signature::{verify, MissingSignaturePolicy};
use crate::utils::webhook_payload::WebhookPayload;

const SIGNATURE_HEADERS: [&str; 2] = ["x-clickup-signature", "x-signature"];

fn signature_header(headers: &HeaderMap) -> Option<&[u8]> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).map(|v| v.as_bytes()))
}

// The remote tracker retries anything that is not 2xx, so payloads we cannot
// use are acknowledged rather than rejected.
fn skipped(reason: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "ok": true, "skipped": true, "reason": reason })),
    )
        .into_response()
}

fn authorized(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    policy: MissingSignaturePolicy,
) -> bool {
    verify(
        body,
        signature_header(headers),
        state.config.clickup_webhook_secret.as_deref(),
        policy,
    )
}

pub async fn method_not_allowed() -> Response {
    JsonResponse::method_not_allowed("Method Not Allowed").into_response()
}

/// Task-change notifications from the remote tracker.
pub async fn clickup_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&state, &headers, &body, MissingSignaturePolicy::Reject) {
        warn!("rejected task webhook with invalid signature");
        return JsonResponse::unauthorized("Invalid signature").into_response();
    }

    let Some((payload, _raw)) = WebhookPayload::parse(&body) else {
        return skipped("invalid_payload");
    };
    let Some(task_id) = payload.task_id.clone() else {
        return skipped("missing_task_id");
    };

    let outcome = match state
        .synchronizer
        .apply_task_event(&task_id, payload.list_id.as_deref())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(%task_id, %err, "failed to persist task from webhook");
            return JsonResponse::server_error("Failed to persist task").into_response();
        }
    };

    let (event_id, phase, upsert, list_id) = match outcome {
        TaskEventOutcome::Persisted {
            event_id,
            phase,
            upsert,
            task,
        } => (event_id, phase, upsert, task.list_id().map(str::to_string)),
        TaskEventOutcome::NotIncluded => return skipped("not_tagged"),
        TaskEventOutcome::UnlinkedList(list_id) => {
            info!(%task_id, ?list_id, "task list is not linked to any event");
            return skipped("unlinked_list");
        }
        TaskEventOutcome::FetchFailed(_) => return skipped("task_fetch_failed"),
    };

    let input = json!({
        "task_id": task_id,
        "event_id": event_id,
        "list_id": list_id.or(payload.list_id),
        "phase": phase,
        "webhook_event": payload.event,
    });
    let new_run = NewWorkflowRun::for_entity(
        &state.config.task_workflow_name,
        &task_id,
        TriggeredBy::Webhook,
        input,
    );

    match enqueue_and_wake(state.ledger.as_ref(), state.waker.as_ref(), new_run).await {
        Ok(enqueued) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "task_id": task_id,
                "event_id": event_id,
                "phase": phase,
                "task": match upsert {
                    UpsertOutcome::Inserted => "inserted",
                    UpsertOutcome::Updated => "updated",
                },
                "run_id": enqueued.run().id,
                "status": enqueued.label(),
            })),
        )
            .into_response(),
        Err(err) => {
            error!(%task_id, ?err, "failed to enqueue task workflow");
            JsonResponse::server_error("Failed to enqueue").into_response()
        }
    }
}

/// Artifact generation trigger. Callers of this endpoint do not sign their
/// requests, so a missing signature header is accepted.
pub async fn generate_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&state, &headers, &body, MissingSignaturePolicy::Accept) {
        warn!("rejected artifact webhook with invalid signature");
        return JsonResponse::unauthorized("Invalid signature").into_response();
    }

    let Some((payload, raw)) = WebhookPayload::parse(&body) else {
        return skipped("invalid_payload");
    };
    let Some(task_id) = payload.task_id else {
        return skipped("missing_task_id");
    };
    let workflow = payload
        .workflow
        .unwrap_or_else(|| state.config.artifact_workflow_name.clone());

    let mut input = raw;
    if let Value::Object(map) = &mut input {
        map.insert("task_id".to_string(), Value::String(task_id.clone()));
    }
    let new_run = NewWorkflowRun::for_entity(&workflow, &task_id, TriggeredBy::Webhook, input);

    match enqueue_and_wake(state.ledger.as_ref(), state.waker.as_ref(), new_run).await {
        Ok(enqueued) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "run_id": enqueued.run().id,
                "workflow": workflow,
                "status": enqueued.label(),
            })),
        )
            .into_response(),
        Err(err) => {
            error!(%task_id, %workflow, ?err, "failed to enqueue artifact workflow");
            JsonResponse::server_error("Failed to enqueue").into_response()
        }
    }
}
