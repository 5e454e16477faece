//! Sync endpoint routes.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::sync::CycleReport;
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sync", post(trigger_handler))
        .route("/api/sync/status", get(status_handler))
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    queued: bool,
    running: bool,
}

/// GET /api/sync/status - Report of the last completed cycle.
async fn status_handler(State(state): State<AppState>) -> Result<Json<CycleReport>> {
    state
        .sync
        .last_report()
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no sync cycle has completed yet".into()))
}

/// POST /api/sync - Queue a cycle without waiting for it.
async fn trigger_handler(State(state): State<AppState>) -> (StatusCode, Json<TriggerResponse>) {
    let queued = state.sync_handle.trigger();
    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            queued,
            running: state.sync.is_running(),
        }),
    )
}
