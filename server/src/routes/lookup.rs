//! Read-only routes that feed the tracking form.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use fieldtrack_engine::{Indicator, Institution, Municipality, Project, RowId, Site};
use serde::Deserialize;

use crate::db::{self, ProjectDetails};
use crate::error::{AppError, Result};
use crate::AppState;

/// Create lookup routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/municipalities", get(municipalities_handler))
        .route("/api/institutions/{municipality_id}", get(institutions_handler))
        .route("/api/sites/{institution_id}", get(sites_handler))
        .route("/api/indicators", get(indicators_handler))
        .route("/api/projects/search", get(search_handler))
        .route("/api/projects/{code}", get(project_handler))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

/// GET /api/municipalities
async fn municipalities_handler(State(state): State<AppState>) -> Result<Json<Vec<Municipality>>> {
    Ok(Json(db::list_municipalities(&state.pool).await?))
}

/// GET /api/institutions/{municipality_id}
async fn institutions_handler(
    State(state): State<AppState>,
    Path(municipality_id): Path<RowId>,
) -> Result<Json<Vec<Institution>>> {
    Ok(Json(db::list_institutions(&state.pool, municipality_id).await?))
}

/// GET /api/sites/{institution_id}
async fn sites_handler(
    State(state): State<AppState>,
    Path(institution_id): Path<RowId>,
) -> Result<Json<Vec<Site>>> {
    Ok(Json(db::list_sites(&state.pool, institution_id).await?))
}

/// GET /api/indicators
async fn indicators_handler(State(state): State<AppState>) -> Result<Json<Vec<Indicator>>> {
    Ok(Json(db::list_indicators(&state.pool).await?))
}

/// GET /api/projects/search?q= - Up to ten projects by code or name.
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Project>>> {
    Ok(Json(db::search_projects(&state.pool, &params.q).await?))
}

/// GET /api/projects/{code} - A project by its BPIN code, with its
/// activities and latest progress per site.
async fn project_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ProjectDetails>> {
    db::find_project_by_code(&state.pool, &code)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no project with code {code}")))
}
