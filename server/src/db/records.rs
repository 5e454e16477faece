//! Local mutations: the form-save path and catalog lookups.
//!
//! Lookups go through the same natural keys the merge uses, so a row
//! created here and the same row arriving from the remote collapse to one.

use super::meta;
use super::pool::Pool;
use fieldtrack_engine::model::non_empty;
use fieldtrack_engine::{normalize_name, FundingSplit, RowId};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Project fields of a tracking form.
///
/// `initial_value` and `funding_source` are the manual figures. They are
/// only stored when the four components add up to nothing.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    #[serde(default)]
    pub bpin_code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub contract_year: i64,
    #[serde(default)]
    pub contractor: Option<String>,
    #[serde(default)]
    pub initial_value: f64,
    #[serde(default)]
    pub value_rp: f64,
    #[serde(default)]
    pub value_sgp: f64,
    #[serde(default)]
    pub value_men: f64,
    #[serde(default)]
    pub value_sgr: f64,
    #[serde(default)]
    pub funding_source: Option<String>,
}

/// Where an observation was taken, by display names.
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub municipality: String,
    pub institution: String,
    pub site: String,
}

/// One submission of the tracking form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTracking {
    pub project: NewProject,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub indicator: Option<String>,
    #[serde(default)]
    pub progress_pct: Option<f64>,
    #[serde(default)]
    pub tracked_on: Option<String>,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_addition: bool,
    #[serde(default)]
    pub addition_value: f64,
    #[serde(default)]
    pub addition_source: Option<String>,
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// Ids written by a form save.
#[derive(Debug, Clone, Serialize)]
pub struct SavedTracking {
    pub project_id: RowId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<RowId>,
    pub entry_ids: Vec<RowId>,
}

/// A tracking entry to insert or update, with every reference resolved.
#[derive(Debug, Clone)]
pub struct EntryInput<'a> {
    pub project_id: RowId,
    pub activity_id: Option<RowId>,
    pub site_id: Option<RowId>,
    pub indicator_id: Option<RowId>,
    pub form: &'a NewTracking,
}

fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

fn trimmed(value: Option<&str>) -> Option<String> {
    non_empty(value).map(str::to_string)
}

/// Find the id whose name normalizes to the same key as `name`.
///
/// `query` selects `id` and `name`. When `parent` is set, it is bound as the
/// only parameter (an inner `None` binds NULL).
async fn match_name(
    conn: &mut SqliteConnection,
    query: &str,
    parent: Option<Option<RowId>>,
    name: &str,
) -> Result<Option<RowId>, sqlx::Error> {
    let key = normalize_name(name);
    let mut q = sqlx::query(query);
    if let Some(parent) = parent {
        q = q.bind(parent);
    }
    for row in q.fetch_all(&mut *conn).await? {
        let candidate: String = row.try_get("name")?;
        if normalize_name(&candidate) == key {
            return Ok(Some(row.try_get("id")?));
        }
    }
    Ok(None)
}

pub async fn find_or_create_municipality(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<RowId, sqlx::Error> {
    if let Some(id) = match_name(
        conn,
        "SELECT id, name FROM municipalities ORDER BY id",
        None,
        name,
    )
    .await?
    {
        return Ok(id);
    }
    let result = sqlx::query("INSERT INTO municipalities (name) VALUES (?)")
        .bind(name.trim())
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_or_create_institution(
    conn: &mut SqliteConnection,
    name: &str,
    municipality_id: Option<RowId>,
) -> Result<RowId, sqlx::Error> {
    if let Some(id) = match_name(
        conn,
        "SELECT id, name FROM institutions WHERE municipality_id IS ? ORDER BY id",
        Some(municipality_id),
        name,
    )
    .await?
    {
        return Ok(id);
    }
    let result = sqlx::query("INSERT INTO institutions (name, municipality_id) VALUES (?, ?)")
        .bind(name.trim())
        .bind(municipality_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_or_create_site(
    conn: &mut SqliteConnection,
    name: &str,
    institution_id: Option<RowId>,
) -> Result<RowId, sqlx::Error> {
    if let Some(id) = match_name(
        conn,
        "SELECT id, name FROM sites WHERE institution_id IS ? ORDER BY id",
        Some(institution_id),
        name,
    )
    .await?
    {
        return Ok(id);
    }
    let result = sqlx::query("INSERT INTO sites (name, institution_id) VALUES (?, ?)")
        .bind(name.trim())
        .bind(institution_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Indicators are a fixed catalog: looked up, never created by a form.
pub async fn find_indicator(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<RowId>, sqlx::Error> {
    match_name(conn, "SELECT id, name FROM indicators ORDER BY id", None, name).await
}

pub async fn find_or_create_indicator(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<RowId, sqlx::Error> {
    if let Some(id) = find_indicator(conn, name).await? {
        return Ok(id);
    }
    let result = sqlx::query("INSERT INTO indicators (name) VALUES (?)")
        .bind(name.trim())
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Reuse the project with the same code, or else the same normalized name.
pub async fn find_or_create_project(
    conn: &mut SqliteConnection,
    project: &NewProject,
) -> Result<RowId, sqlx::Error> {
    let code = non_empty(project.bpin_code.as_deref());
    let existing = match code {
        Some(code) => {
            sqlx::query_scalar::<_, RowId>(
                "SELECT id FROM projects WHERE TRIM(bpin_code) = ? ORDER BY id LIMIT 1",
            )
            .bind(code)
            .fetch_optional(&mut *conn)
            .await?
        }
        None => {
            match_name(
                conn,
                "SELECT id, name FROM projects \
                 WHERE bpin_code IS NULL OR TRIM(bpin_code) = '' ORDER BY id",
                None,
                &project.name,
            )
            .await?
        }
    };
    if let Some(id) = existing {
        return Ok(id);
    }

    let split = FundingSplit {
        rp: project.value_rp,
        sgp: project.value_sgp,
        men: project.value_men,
        sgr: project.value_sgr,
    };
    let (initial_value, funding_source) =
        split.resolve(project.initial_value, project.funding_source.as_deref());

    let result = sqlx::query(
        r#"
        INSERT INTO projects (
            bpin_code, name, contract_year, contractor, initial_value,
            value_rp, value_sgp, value_men, value_sgr, funding_source, sync_uid
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(code)
    .bind(project.name.trim())
    .bind(project.contract_year)
    .bind(trimmed(project.contractor.as_deref()))
    .bind(initial_value)
    .bind(project.value_rp)
    .bind(project.value_sgp)
    .bind(project.value_men)
    .bind(project.value_sgr)
    .bind(funding_source)
    .bind(new_uid())
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_or_create_activity(
    conn: &mut SqliteConnection,
    project_id: RowId,
    description: &str,
) -> Result<RowId, sqlx::Error> {
    if let Some(id) = match_name(
        conn,
        "SELECT id, description AS name FROM activities WHERE project_id IS ? ORDER BY id",
        Some(Some(project_id)),
        description,
    )
    .await?
    {
        return Ok(id);
    }
    let result =
        sqlx::query("INSERT INTO activities (project_id, description, sync_uid) VALUES (?, ?, ?)")
            .bind(project_id)
            .bind(description.trim())
            .bind(new_uid())
            .execute(&mut *conn)
            .await?;
    Ok(result.last_insert_rowid())
}

/// Insert an entry, or update the one already recorded for the same
/// project, site, date and activity. The `sync_uid` of an existing row is
/// kept.
pub async fn upsert_tracking_entry(
    conn: &mut SqliteConnection,
    input: &EntryInput<'_>,
) -> Result<RowId, sqlx::Error> {
    let form = input.form;
    let tracked_on = trimmed(form.tracked_on.as_deref());

    let existing = sqlx::query_scalar::<_, RowId>(
        r#"
        SELECT id FROM tracking_entries
        WHERE project_id = ? AND site_id IS ? AND tracked_on IS ? AND activity_id IS ?
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(input.project_id)
    .bind(input.site_id)
    .bind(&tracked_on)
    .bind(input.activity_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = existing {
        sqlx::query(
            r#"
            UPDATE tracking_entries SET
                indicator_id = ?, progress_pct = ?, responsible = ?, notes = ?,
                is_addition = ?, addition_value = ?, addition_source = ?
            WHERE id = ?
            "#,
        )
        .bind(input.indicator_id)
        .bind(form.progress_pct)
        .bind(trimmed(form.responsible.as_deref()))
        .bind(trimmed(form.notes.as_deref()))
        .bind(form.is_addition)
        .bind(form.addition_value)
        .bind(trimmed(form.addition_source.as_deref()))
        .bind(id)
        .execute(&mut *conn)
        .await?;
        return Ok(id);
    }

    let result = sqlx::query(
        r#"
        INSERT INTO tracking_entries (
            project_id, activity_id, site_id, indicator_id, progress_pct, tracked_on,
            responsible, notes, is_addition, addition_value, addition_source, sync_uid
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(input.project_id)
    .bind(input.activity_id)
    .bind(input.site_id)
    .bind(input.indicator_id)
    .bind(form.progress_pct)
    .bind(&tracked_on)
    .bind(trimmed(form.responsible.as_deref()))
    .bind(trimmed(form.notes.as_deref()))
    .bind(form.is_addition)
    .bind(form.addition_value)
    .bind(trimmed(form.addition_source.as_deref()))
    .bind(new_uid())
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Save one form submission and record the local change, all in one
/// transaction. One entry is written per location. Callers reject forms
/// without locations.
pub async fn save_tracking(
    pool: &Pool,
    form: &NewTracking,
    indicator_id: Option<RowId>,
) -> Result<SavedTracking, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let project_id = find_or_create_project(&mut tx, &form.project).await?;
    let activity_id = match non_empty(form.activity.as_deref()) {
        Some(description) => {
            Some(find_or_create_activity(&mut tx, project_id, description).await?)
        }
        None => None,
    };

    let mut site_ids = Vec::with_capacity(form.locations.len());
    for location in &form.locations {
        let municipality = find_or_create_municipality(&mut tx, &location.municipality).await?;
        let institution =
            find_or_create_institution(&mut tx, &location.institution, Some(municipality)).await?;
        site_ids.push(find_or_create_site(&mut tx, &location.site, Some(institution)).await?);
    }

    let mut entry_ids = Vec::with_capacity(site_ids.len());
    for site_id in site_ids {
        let input = EntryInput {
            project_id,
            activity_id,
            site_id: Some(site_id),
            indicator_id,
            form,
        };
        entry_ids.push(upsert_tracking_entry(&mut tx, &input).await?);
    }

    meta::touch(&mut *tx).await?;
    tx.commit().await?;

    Ok(SavedTracking {
        project_id,
        activity_id,
        entry_ids,
    })
}

/// Delete every project, activity and tracking entry, and record the change.
pub async fn clean_transactional(pool: &Pool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM tracking_entries")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM activities").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM projects").execute(&mut *tx).await?;
    meta::touch(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}
