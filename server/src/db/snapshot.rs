//! Whole-dataset reads of the local store.

use super::meta;
use super::pool::Pool;
use fieldtrack_engine::{
    Activity, Dataset, Indicator, Institution, LocalSnapshot, Municipality, Project, Site,
    TrackingEntry,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Read every synced table plus the local change stamp.
///
/// The stamp is read first: a write that lands between the table reads
/// moves the stamp, so the later compare-and-set of the baseline fails and
/// the cycle does not install a stale baseline.
pub async fn read_local_snapshot(pool: &Pool) -> Result<LocalSnapshot, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let last_change_at = meta::read(&mut *conn).await?;

    let mut dataset = read_catalogs(&mut conn).await?;
    dataset.projects = read_projects(&mut conn).await?;
    dataset.activities = read_activities(&mut conn).await?;
    dataset.tracking_entries = read_tracking_entries(&mut conn).await?;

    Ok(LocalSnapshot::new(dataset, last_change_at))
}

/// Read the four catalog tables. Transactional tables are left empty.
pub async fn read_catalogs(conn: &mut SqliteConnection) -> Result<Dataset, sqlx::Error> {
    let municipalities = sqlx::query("SELECT id, name FROM municipalities ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(decode_municipality)
        .collect::<Result<_, _>>()?;

    let institutions =
        sqlx::query("SELECT id, name, municipality_id FROM institutions ORDER BY id")
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(decode_institution)
            .collect::<Result<_, _>>()?;

    let sites = sqlx::query("SELECT id, name, institution_id FROM sites ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(decode_site)
        .collect::<Result<_, _>>()?;

    let indicators = sqlx::query("SELECT id, name FROM indicators ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(decode_indicator)
        .collect::<Result<_, _>>()?;

    Ok(Dataset {
        municipalities,
        institutions,
        sites,
        indicators,
        ..Dataset::default()
    })
}

pub async fn read_projects(conn: &mut SqliteConnection) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query(
        r#"
        SELECT id, bpin_code, name, contract_year, contractor, initial_value,
               value_rp, value_sgp, value_men, value_sgr, funding_source, sync_uid
        FROM projects
        ORDER BY id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(decode_project)
    .collect()
}

pub async fn read_activities(conn: &mut SqliteConnection) -> Result<Vec<Activity>, sqlx::Error> {
    sqlx::query("SELECT id, project_id, description, sync_uid FROM activities ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(decode_activity)
        .collect()
}

pub async fn read_tracking_entries(
    conn: &mut SqliteConnection,
) -> Result<Vec<TrackingEntry>, sqlx::Error> {
    sqlx::query(
        r#"
        SELECT id, project_id, activity_id, site_id, indicator_id, progress_pct,
               tracked_on, responsible, notes, is_addition, addition_value,
               addition_source, sync_uid
        FROM tracking_entries
        ORDER BY id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(decode_tracking_entry)
    .collect()
}

pub(super) fn decode_municipality(row: &SqliteRow) -> Result<Municipality, sqlx::Error> {
    Ok(Municipality {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

pub(super) fn decode_institution(row: &SqliteRow) -> Result<Institution, sqlx::Error> {
    Ok(Institution {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        municipality_id: row.try_get("municipality_id")?,
    })
}

pub(super) fn decode_site(row: &SqliteRow) -> Result<Site, sqlx::Error> {
    Ok(Site {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        institution_id: row.try_get("institution_id")?,
    })
}

pub(super) fn decode_indicator(row: &SqliteRow) -> Result<Indicator, sqlx::Error> {
    Ok(Indicator {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

pub(super) fn decode_project(row: &SqliteRow) -> Result<Project, sqlx::Error> {
    Ok(Project {
        id: row.try_get("id")?,
        bpin_code: row.try_get("bpin_code")?,
        name: row.try_get("name")?,
        contract_year: row.try_get("contract_year")?,
        contractor: row.try_get("contractor")?,
        initial_value: row.try_get("initial_value")?,
        value_rp: row.try_get("value_rp")?,
        value_sgp: row.try_get("value_sgp")?,
        value_men: row.try_get("value_men")?,
        value_sgr: row.try_get("value_sgr")?,
        funding_source: row.try_get("funding_source")?,
        sync_uid: row.try_get("sync_uid")?,
    })
}

pub(super) fn decode_activity(row: &SqliteRow) -> Result<Activity, sqlx::Error> {
    Ok(Activity {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        description: row.try_get("description")?,
        sync_uid: row.try_get("sync_uid")?,
    })
}

fn decode_tracking_entry(row: &SqliteRow) -> Result<TrackingEntry, sqlx::Error> {
    Ok(TrackingEntry {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        activity_id: row.try_get("activity_id")?,
        site_id: row.try_get("site_id")?,
        indicator_id: row.try_get("indicator_id")?,
        progress_pct: row.try_get("progress_pct")?,
        tracked_on: row.try_get("tracked_on")?,
        responsible: row.try_get("responsible")?,
        notes: row.try_get("notes")?,
        is_addition: row.try_get("is_addition")?,
        addition_value: row.try_get("addition_value")?,
        addition_source: row.try_get("addition_source")?,
        sync_uid: row.try_get("sync_uid")?,
    })
}
