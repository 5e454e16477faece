//! Catalog seeding at start-up.

use super::pool::Pool;
use super::records::{
    find_or_create_indicator, find_or_create_institution, find_or_create_municipality,
    find_or_create_site,
};
use serde::Deserialize;
use std::path::Path;

/// One row of the site hierarchy.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSeed {
    pub municipality: String,
    pub institution: String,
    pub site: String,
}

/// Catalog rows every machine starts with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub sites: Vec<SiteSeed>,
}

/// Seed file errors.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("cannot read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid seed file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CatalogSeed {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Create the seed's missing catalog rows. Returns the number of seed rows
/// processed.
///
/// The change stamp is left alone: seeding is not a user change, so a
/// seeded machine with no projects still takes the bootstrap download.
pub async fn seed_catalogs(pool: &Pool, seed: &CatalogSeed) -> Result<usize, SeedError> {
    let mut tx = pool.begin().await?;
    let mut processed = 0;

    for name in seed.indicators.iter().filter(|n| !n.trim().is_empty()) {
        find_or_create_indicator(&mut tx, name).await?;
        processed += 1;
    }

    for row in &seed.sites {
        if [&row.municipality, &row.institution, &row.site]
            .iter()
            .any(|name| name.trim().is_empty())
        {
            tracing::warn!(site = %row.site, "skipping incomplete seed row");
            continue;
        }
        let municipality = find_or_create_municipality(&mut tx, &row.municipality).await?;
        let institution =
            find_or_create_institution(&mut tx, &row.institution, Some(municipality)).await?;
        find_or_create_site(&mut tx, &row.site, Some(institution)).await?;
        processed += 1;
    }

    tx.commit().await?;
    Ok(processed)
}
