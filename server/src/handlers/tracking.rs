//! Tracking form handler - validates a submission and saves it locally.

use crate::db::{self, NewTracking, SavedTracking};
use crate::error::{AppError, Result};
use fieldtrack_engine::model::non_empty;
use sqlx::SqlitePool;

/// Validate and save one tracking form.
///
/// The caller is responsible for triggering a sync afterwards; the save
/// itself already records the local change.
pub async fn handle_save_tracking(pool: &SqlitePool, form: NewTracking) -> Result<SavedTracking> {
    validate(&form)?;

    let indicator_id = match non_empty(form.indicator.as_deref()) {
        Some(name) => {
            let mut conn = pool.acquire().await?;
            let id = db::find_indicator(&mut conn, name).await?;
            Some(id.ok_or_else(|| AppError::BadRequest(format!("unknown indicator: {name}")))?)
        }
        None => None,
    };

    let saved = db::save_tracking(pool, &form, indicator_id).await?;
    tracing::info!(
        project_id = saved.project_id,
        entries = saved.entry_ids.len(),
        "tracking form saved"
    );
    Ok(saved)
}

fn validate(form: &NewTracking) -> Result<()> {
    if non_empty(Some(form.project.name.as_str())).is_none() {
        return Err(AppError::BadRequest("project name is required".into()));
    }
    if let Some(pct) = form.progress_pct {
        if !(0.0..=100.0).contains(&pct) {
            return Err(AppError::BadRequest(format!(
                "progress_pct must be between 0 and 100, got {pct}"
            )));
        }
    }
    if form.locations.is_empty() {
        return Err(AppError::BadRequest("at least one location is required".into()));
    }
    for location in &form.locations {
        let complete = [&location.municipality, &location.institution, &location.site]
            .iter()
            .all(|name| non_empty(Some(name.as_str())).is_some());
        if !complete {
            return Err(AppError::BadRequest(
                "every location needs a municipality, institution and site".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(value: serde_json::Value) -> NewTracking {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_blank_project_name_rejected() {
        let f = form(json!({"project": {"name": "   "}}));
        assert!(matches!(validate(&f), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_progress_out_of_range_rejected() {
        let f = form(json!({"project": {"name": "Aulas"}, "progress_pct": 140.0}));
        assert!(matches!(validate(&f), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_incomplete_location_rejected() {
        let f = form(json!({
            "project": {"name": "Aulas"},
            "locations": [{"municipality": "Pasto", "institution": "", "site": "Sede 1"}]
        }));
        assert!(matches!(validate(&f), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_form_without_locations_rejected() {
        let f = form(json!({"project": {"name": "Aulas"}, "locations": []}));
        assert!(matches!(validate(&f), Err(AppError::BadRequest(_))));
        let f = form(json!({"project": {"name": "Aulas"}}));
        assert!(matches!(validate(&f), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_minimal_form_accepted() {
        let f = form(json!({
            "project": {"name": "Aulas"},
            "locations": [{"municipality": "Pasto", "institution": "IE 1", "site": "Sede 1"}]
        }));
        assert!(validate(&f).is_ok());
    }
}
