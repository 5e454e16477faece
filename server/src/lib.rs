//! FieldTrack Server - local store for field tracking kept in sync with a
//! shared remote tree.
//!
//! Form submissions are saved to SQLite and a background driver reconciles
//! the whole local snapshot with the remote one, using the decisions made
//! by `fieldtrack-engine`.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod remote;
pub mod routes;
pub mod sync;

use crate::config::Config;
use crate::db::Pool;
use crate::sync::{SyncCoordinator, SyncHandle};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub sync: Arc<SyncCoordinator>,
    pub sync_handle: SyncHandle,
}

/// Build the application router with tracing and CORS layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
