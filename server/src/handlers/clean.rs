//! Clean handler - wipes local transactional data.

use crate::db;
use crate::error::{AppError, Result};
use sqlx::SqlitePool;

/// Delete all projects, activities and tracking entries. Catalogs are kept.
///
/// The next sync publishes the empty state, which clears the same tables
/// on the remote.
pub async fn handle_clean(pool: &SqlitePool, allowed: bool) -> Result<()> {
    if !allowed {
        return Err(AppError::Forbidden(
            "database clean is disabled on this server".into(),
        ));
    }
    db::clean_transactional(pool).await?;
    tracing::warn!("local transactional data deleted");
    Ok(())
}
