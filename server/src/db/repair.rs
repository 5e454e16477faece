//! One-off data repair run at start-up.

use super::meta;
use super::pool::Pool;
use uuid::Uuid;

const KEYED_TABLES: [&str; 3] = ["projects", "activities", "tracking_entries"];

/// Give every transactional row without a `sync_uid` a fresh one.
///
/// Rows written before identifiers existed would otherwise be published
/// under `id_<n>` keys that collide across machines. Returns the number of
/// rows repaired; when any were, the local change is recorded so the next
/// cycle publishes them.
pub async fn backfill_sync_uids(pool: &Pool) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut repaired = 0;

    for table in KEYED_TABLES {
        let ids: Vec<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM {table} WHERE sync_uid IS NULL OR TRIM(sync_uid) = ''"
        ))
        .fetch_all(&mut *tx)
        .await?;

        let count = ids.len();
        for id in ids {
            sqlx::query(&format!("UPDATE {table} SET sync_uid = ? WHERE id = ?"))
                .bind(Uuid::new_v4().to_string())
                .bind(id)
                .execute(&mut *tx)
                .await?;
            repaired += 1;
        }
        if count > 0 {
            tracing::debug!(table, count, "backfilled sync identifiers");
        }
    }

    if repaired > 0 {
        meta::touch(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(repaired)
}
