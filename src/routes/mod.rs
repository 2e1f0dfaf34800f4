pub mod runs;
pub mod sync;
pub mod webhooks;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::responses::JsonResponse;
use crate::state::AppState;

async fn health() -> impl IntoResponse {
    JsonResponse::success("ok")
}

pub fn build_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route(
            "/clickup",
            post(webhooks::clickup_webhook).fallback(webhooks::method_not_allowed),
        )
        .route(
            "/generate",
            post(webhooks::generate_webhook).fallback(webhooks::method_not_allowed),
        );

    // Processor-facing; each handler checks the bearer token.
    let internal_routes = Router::new()
        .route("/runs", get(runs::list_runs))
        .route("/runs/{run_id}/claim", post(runs::claim_run))
        .route("/runs/{run_id}/steps", post(runs::start_step))
        .route("/runs/{run_id}/steps/{step_id}", post(runs::finish_step))
        .route("/runs/{run_id}/complete", post(runs::complete_run));

    let event_routes = Router::new()
        .route("/{event_id}/provision", post(sync::provision_event))
        .route(
            "/{event_id}/webhooks",
            post(sync::register_event_webhooks).delete(sync::unregister_event_webhooks),
        )
        .route("/{event_id}/sync", post(sync::sync_event))
        .route("/{event_id}/tasks", get(sync::list_event_tasks));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/runs", post(runs::trigger_run).get(runs::find_run))
        .route("/api/runs/{run_id}", get(runs::get_run_status))
        .route("/api/sync", post(sync::sync_all))
        .nest("/api/webhooks", webhook_routes)
        .nest("/api/internal", internal_routes)
        .nest("/api/events", event_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
