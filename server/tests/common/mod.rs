//! Shared fixtures for the server integration tests.

#![allow(dead_code)]

use fieldtrack_server::db::{self, CatalogSeed, NewTracking, Pool, SiteSeed};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;

/// A migrated in-memory store. One connection that never expires, so every
/// query sees the same database.
pub async fn memory_pool() -> Pool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory database");
    db::run_migrations(&pool).await.expect("run migrations");
    pool
}

/// The catalogs of a freshly installed machine. Names differ from
/// [`remote_tree`] only in case, accents and padding.
pub fn seed() -> CatalogSeed {
    CatalogSeed {
        indicators: vec!["Aulas Construidas".to_string()],
        sites: vec![SiteSeed {
            municipality: "Pasto".to_string(),
            institution: "Institucion Central".to_string(),
            site: "Sede principal".to_string(),
        }],
    }
}

pub fn form(value: Value) -> NewTracking {
    serde_json::from_value(value).expect("valid form")
}

/// A form at the one site of [`seed`]. Saved into an empty store it writes
/// six rows: the site with its parents, the project, the activity and one
/// entry.
pub fn sample_form() -> NewTracking {
    form(json!({
        "project": {"name": "Aulas rurales", "bpin_code": "2024001", "contract_year": 2024},
        "activity": "Cimentación",
        "progress_pct": 25.0,
        "tracked_on": "2024-05-02",
        "responsible": "Interventoría",
        "locations": [{
            "municipality": "Pasto",
            "institution": "Institucion Central",
            "site": "Sede principal"
        }]
    }))
}

pub const REMOTE_STAMP: &str = "2024-05-01T12:00:00.000Z";

/// A remote tree written by another machine, in its own id space.
pub fn remote_tree() -> Value {
    json!({
        "meta": {"last_change_at": REMOTE_STAMP},
        "municipalities": {"id_7": {"id": 7, "name": "PASTO "}},
        "institutions": {"id_3": {"id": 3, "name": "Institución  Central", "municipality_id": 7}},
        "sites": {"id_9": {"id": 9, "name": "Sede Principal", "institution_id": 3}},
        "indicators": {"id_2": {"id": 2, "name": "aulas construidas"}},
        "projects": {
            "p-1": {"id": 1, "bpin_code": "2024001", "name": "Aulas rurales", "sync_uid": "p-1"}
        },
        "activities": {
            "a-1": {"id": 1, "project_id": 1, "description": "Cimentación", "sync_uid": "a-1"}
        },
        "tracking_entries": {
            "e-1": {
                "id": 1, "project_id": 1, "activity_id": 1, "site_id": 9, "indicator_id": 2,
                "progress_pct": 40.0, "tracked_on": "2024-04-30", "sync_uid": "e-1"
            }
        }
    })
}
