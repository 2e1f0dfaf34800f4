use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::sync::{ProvisionRequest, SyncError};

fn sync_error_response(err: SyncError) -> Response {
    match err {
        SyncError::EventNotFound(_) => JsonResponse::not_found("Event not found").into_response(),
        SyncError::NotLinked(_) => {
            JsonResponse::conflict("Event has no linked lists; provision it first").into_response()
        }
        SyncError::NotConfigured(name) => {
            JsonResponse::unavailable_with_code(&format!("{} is not configured", name), name)
                .into_response()
        }
        SyncError::Remote(err) => {
            error!(%err, "remote tracker call failed");
            JsonResponse::bad_gateway("Remote tracker request failed").into_response()
        }
        SyncError::Database(err) => {
            error!(?err, "sync persistence failed");
            JsonResponse::server_error("Database error").into_response()
        }
    }
}

fn ok<T: Serialize>(key: &str, value: T) -> Response {
    match serde_json::to_value(value) {
        Ok(value) => {
            let mut body = Map::new();
            body.insert("success".to_string(), Value::Bool(true));
            body.insert(key.to_string(), value);
            (StatusCode::OK, Json(Value::Object(body))).into_response()
        }
        Err(err) => {
            error!(?err, "failed to serialize sync response");
            JsonResponse::server_error("Failed to encode response").into_response()
        }
    }
}

pub async fn provision_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<ProvisionRequest>,
) -> Response {
    if payload.title.trim().is_empty() {
        return JsonResponse::bad_request("title is required").into_response();
    }
    match state.synchronizer.provision_event(event_id, payload).await {
        Ok(outcome) => ok("provision", outcome),
        Err(err) => sync_error_response(err),
    }
}

pub async fn register_event_webhooks(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Response {
    match state.synchronizer.register_event_webhooks(event_id).await {
        Ok(report) => ok("registration", report),
        Err(err) => sync_error_response(err),
    }
}

pub async fn unregister_event_webhooks(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Response {
    match state.synchronizer.deactivate_event_webhooks(event_id).await {
        Ok(report) => ok("registration", report),
        Err(err) => sync_error_response(err),
    }
}

pub async fn sync_event(State(state): State<AppState>, Path(event_id): Path<Uuid>) -> Response {
    match state.synchronizer.sync_event_by_id(event_id).await {
        Ok(report) => ok("report", report),
        Err(err) => sync_error_response(err),
    }
}

/// The local mirror of an event's remote tasks.
pub async fn list_event_tasks(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Response {
    let repo = state.synchronizer.repo();
    match repo.find_event(event_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return JsonResponse::not_found("Event not found").into_response(),
        Err(err) => return sync_error_response(err.into()),
    }
    match repo.list_synced_tasks(event_id).await {
        Ok(tasks) => ok("tasks", tasks),
        Err(err) => sync_error_response(err.into()),
    }
}

pub async fn sync_all(State(state): State<AppState>) -> Response {
    match state.synchronizer.sync_all().await {
        Ok(report) => ok("report", report),
        Err(err) => sync_error_response(err),
    }
}
