//! Local mutation routes.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::db::{NewTracking, SavedTracking};
use crate::error::Result;
use crate::handlers::{handle_clean, handle_save_tracking};
use crate::AppState;

/// Create tracking routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tracking", post(save_handler))
        .route("/api/clean", post(clean_handler))
}

/// POST /api/tracking - Save a tracking form, then sync.
async fn save_handler(
    State(state): State<AppState>,
    Json(form): Json<NewTracking>,
) -> Result<(StatusCode, Json<SavedTracking>)> {
    let saved = handle_save_tracking(&state.pool, form).await?;
    state.sync_handle.trigger();
    Ok((StatusCode::CREATED, Json(saved)))
}

/// POST /api/clean - Delete local transactional data, then sync.
async fn clean_handler(State(state): State<AppState>) -> Result<StatusCode> {
    handle_clean(&state.pool, state.config.allow_db_clean).await?;
    state.sync_handle.trigger();
    Ok(StatusCode::NO_CONTENT)
}
