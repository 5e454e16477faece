//! Applies a remote snapshot to the local store.
//!
//! The whole merge runs in one transaction: readers see either the state
//! before the download or the fully merged state, and any failure rolls
//! everything back.

use super::meta;
use super::pool::Pool;
use super::snapshot::read_catalogs;
use crate::sync::SyncError;
use fieldtrack_engine::{
    Activity, CatalogInsert, MergePlan, Project, RemoteSnapshot, SkippedRow, Table,
    TrackingEntry,
};
use serde::Serialize;
use sqlx::SqliteConnection;

/// What a merge wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub catalog_inserts: usize,
    pub projects: usize,
    pub activities: usize,
    pub tracking_entries: usize,
    pub duplicates: usize,
    #[serde(skip)]
    pub skipped: Vec<SkippedRow>,
}

/// Replace the local transactional data with `remote`.
///
/// The baseline moves from `expected` to `baseline` in the same
/// transaction. If a local write replaced the stamp since the snapshot was
/// read, the merge is rolled back with [`SyncError::ConcurrentChange`].
pub async fn apply_remote(
    pool: &Pool,
    remote: &RemoteSnapshot,
    expected: Option<&str>,
    baseline: &str,
) -> Result<MergeReport, SyncError> {
    let mut tx = pool.begin().await?;

    // Phase A: catalogs by natural key.
    let local = read_catalogs(&mut tx).await?;
    let plan = MergePlan::build(&local, remote);
    for insert in &plan.catalogs.inserts {
        insert_catalog(&mut tx, insert).await?;
    }
    tracing::debug!(
        municipalities = plan.catalogs.inserted(Table::Municipalities),
        institutions = plan.catalogs.inserted(Table::Institutions),
        sites = plan.catalogs.inserted(Table::Sites),
        indicators = plan.catalogs.inserted(Table::Indicators),
        "catalog reconciliation planned"
    );

    // Phase B: children before parents out, parents before children in.
    sqlx::query("DELETE FROM tracking_entries")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM activities").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM projects").execute(&mut *tx).await?;

    let replacement = &plan.replacement;
    for project in &replacement.projects {
        insert_project(&mut tx, project).await?;
    }
    for activity in &replacement.activities {
        insert_activity(&mut tx, activity).await?;
    }
    for entry in &replacement.tracking_entries {
        insert_tracking_entry(&mut tx, entry).await?;
    }

    if !meta::compare_and_set(&mut *tx, expected, baseline).await? {
        return Err(SyncError::ConcurrentChange);
    }
    tx.commit().await?;

    Ok(MergeReport {
        catalog_inserts: plan.catalogs.inserts.len(),
        projects: replacement.projects.len(),
        activities: replacement.activities.len(),
        tracking_entries: replacement.tracking_entries.len(),
        duplicates: replacement.duplicates,
        skipped: plan.skipped().cloned().collect(),
    })
}

async fn insert_catalog(
    conn: &mut SqliteConnection,
    insert: &CatalogInsert,
) -> Result<(), sqlx::Error> {
    match insert {
        CatalogInsert::Municipality(row) => {
            sqlx::query(
                "INSERT INTO municipalities (id, name) VALUES (?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(row.id)
            .bind(&row.name)
            .execute(&mut *conn)
            .await?;
        }
        CatalogInsert::Institution(row) => {
            sqlx::query(
                "INSERT INTO institutions (id, name, municipality_id) VALUES (?, ?, ?) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(row.id)
            .bind(&row.name)
            .bind(row.municipality_id)
            .execute(&mut *conn)
            .await?;
        }
        CatalogInsert::Site(row) => {
            sqlx::query(
                "INSERT INTO sites (id, name, institution_id) VALUES (?, ?, ?) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(row.id)
            .bind(&row.name)
            .bind(row.institution_id)
            .execute(&mut *conn)
            .await?;
        }
        CatalogInsert::Indicator(row) => {
            sqlx::query("INSERT INTO indicators (id, name) VALUES (?, ?) ON CONFLICT DO NOTHING")
                .bind(row.id)
                .bind(&row.name)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

async fn insert_project(conn: &mut SqliteConnection, row: &Project) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO projects (
            id, bpin_code, name, contract_year, contractor, initial_value,
            value_rp, value_sgp, value_men, value_sgr, funding_source, sync_uid
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(row.id)
    .bind(&row.bpin_code)
    .bind(&row.name)
    .bind(row.contract_year)
    .bind(&row.contractor)
    .bind(row.initial_value)
    .bind(row.value_rp)
    .bind(row.value_sgp)
    .bind(row.value_men)
    .bind(row.value_sgr)
    .bind(&row.funding_source)
    .bind(&row.sync_uid)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_activity(conn: &mut SqliteConnection, row: &Activity) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO activities (id, project_id, description, sync_uid)
        VALUES (?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(row.id)
    .bind(row.project_id)
    .bind(&row.description)
    .bind(&row.sync_uid)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_tracking_entry(
    conn: &mut SqliteConnection,
    row: &TrackingEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO tracking_entries (
            id, project_id, activity_id, site_id, indicator_id, progress_pct, tracked_on,
            responsible, notes, is_addition, addition_value, addition_source, sync_uid
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(row.id)
    .bind(row.project_id)
    .bind(row.activity_id)
    .bind(row.site_id)
    .bind(row.indicator_id)
    .bind(row.progress_pct)
    .bind(&row.tracked_on)
    .bind(&row.responsible)
    .bind(&row.notes)
    .bind(row.is_addition)
    .bind(row.addition_value)
    .bind(&row.addition_source)
    .bind(&row.sync_uid)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
