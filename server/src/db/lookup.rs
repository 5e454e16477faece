//! Read-only lookups behind the tracking form.

use super::pool::Pool;
use super::snapshot::{
    decode_activity, decode_indicator, decode_institution, decode_municipality, decode_project,
    decode_site,
};
use fieldtrack_engine::model::non_empty;
use fieldtrack_engine::{Activity, Indicator, Institution, Municipality, Project, RowId, Site};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Most projects a search returns.
pub const SEARCH_LIMIT: i64 = 10;

/// The latest observation of a project at one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteProgress {
    pub activity_id: Option<RowId>,
    pub site_id: RowId,
    pub site: String,
    pub institution_id: RowId,
    pub institution: String,
    pub municipality_id: RowId,
    pub municipality: String,
    pub progress_pct: Option<f64>,
    pub tracked_on: Option<String>,
}

/// A project with what the form needs to continue tracking it.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetails {
    pub project: Project,
    pub activities: Vec<Activity>,
    pub locations: Vec<SiteProgress>,
}

pub async fn list_municipalities(pool: &Pool) -> Result<Vec<Municipality>, sqlx::Error> {
    sqlx::query("SELECT id, name FROM municipalities ORDER BY name")
        .fetch_all(pool)
        .await?
        .iter()
        .map(decode_municipality)
        .collect()
}

pub async fn list_institutions(
    pool: &Pool,
    municipality_id: RowId,
) -> Result<Vec<Institution>, sqlx::Error> {
    sqlx::query(
        "SELECT id, name, municipality_id FROM institutions \
         WHERE municipality_id = ? ORDER BY name",
    )
    .bind(municipality_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(decode_institution)
    .collect()
}

pub async fn list_sites(pool: &Pool, institution_id: RowId) -> Result<Vec<Site>, sqlx::Error> {
    sqlx::query("SELECT id, name, institution_id FROM sites WHERE institution_id = ? ORDER BY name")
        .bind(institution_id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(decode_site)
        .collect()
}

pub async fn list_indicators(pool: &Pool) -> Result<Vec<Indicator>, sqlx::Error> {
    sqlx::query("SELECT id, name FROM indicators ORDER BY name")
        .fetch_all(pool)
        .await?
        .iter()
        .map(decode_indicator)
        .collect()
}

/// Projects whose code or name contains `query`. A blank query matches
/// nothing.
pub async fn search_projects(pool: &Pool, query: &str) -> Result<Vec<Project>, sqlx::Error> {
    let Some(query) = non_empty(Some(query)) else {
        return Ok(Vec::new());
    };
    let pattern = format!("%{query}%");
    sqlx::query(
        r#"
        SELECT id, bpin_code, name, contract_year, contractor, initial_value,
               value_rp, value_sgp, value_men, value_sgr, funding_source, sync_uid
        FROM projects
        WHERE bpin_code LIKE ? OR name LIKE ?
        ORDER BY id
        LIMIT ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await?
    .iter()
    .map(decode_project)
    .collect()
}

/// The project with this code, its activities and its latest entry per site.
pub async fn find_project_by_code(
    pool: &Pool,
    code: &str,
) -> Result<Option<ProjectDetails>, sqlx::Error> {
    let Some(code) = non_empty(Some(code)) else {
        return Ok(None);
    };
    let mut conn = pool.acquire().await?;

    let project = sqlx::query(
        r#"
        SELECT id, bpin_code, name, contract_year, contractor, initial_value,
               value_rp, value_sgp, value_men, value_sgr, funding_source, sync_uid
        FROM projects
        WHERE TRIM(bpin_code) = ?
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(project) = project.as_ref().map(decode_project).transpose()? else {
        return Ok(None);
    };

    let activities = sqlx::query(
        "SELECT id, project_id, description, sync_uid FROM activities \
         WHERE project_id = ? ORDER BY id",
    )
    .bind(project.id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(decode_activity)
    .collect::<Result<_, _>>()?;

    let locations = sqlx::query(
        r#"
        SELECT e.activity_id, e.progress_pct, e.tracked_on,
               s.id AS site_id, s.name AS site,
               i.id AS institution_id, i.name AS institution,
               m.id AS municipality_id, m.name AS municipality
        FROM tracking_entries e
        JOIN (
            SELECT site_id, MAX(id) AS latest_id
            FROM tracking_entries
            WHERE project_id = ?
            GROUP BY site_id
        ) latest ON e.id = latest.latest_id
        JOIN sites s ON e.site_id = s.id
        JOIN institutions i ON s.institution_id = i.id
        JOIN municipalities m ON i.municipality_id = m.id
        ORDER BY m.name, i.name, s.name
        "#,
    )
    .bind(project.id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(decode_site_progress)
    .collect::<Result<_, _>>()?;

    Ok(Some(ProjectDetails {
        project,
        activities,
        locations,
    }))
}

fn decode_site_progress(row: &SqliteRow) -> Result<SiteProgress, sqlx::Error> {
    Ok(SiteProgress {
        activity_id: row.try_get("activity_id")?,
        site_id: row.try_get("site_id")?,
        site: row.try_get("site")?,
        institution_id: row.try_get("institution_id")?,
        institution: row.try_get("institution")?,
        municipality_id: row.try_get("municipality_id")?,
        municipality: row.try_get("municipality")?,
        progress_pct: row.try_get("progress_pct")?,
        tracked_on: row.try_get("tracked_on")?,
    })
}
