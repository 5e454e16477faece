//! HTTP route definitions.

mod health;
mod lookup;
mod sync;
mod tracking;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(lookup::routes())
        .merge(sync::routes())
        .merge(tracking::routes())
}
