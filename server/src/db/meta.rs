//! Sync bookkeeping in the `app_meta` table.
//!
//! The local change stamp is stored as an ISO-8601 string with millisecond
//! precision and a `Z` suffix. Values in that form sort lexicographically,
//! which lets SQLite's scalar `MAX` keep the stamp from moving backwards.
//! A stored value in any other form is overwritten by the next touch.

use fieldtrack_engine::ChangeStamp;
use sqlx::{Executor, Sqlite};

/// Key of the local change stamp.
pub const LOCAL_LAST_CHANGE_AT: &str = "local_last_change_at";

/// Read the raw local change stamp.
pub async fn read<'e, E>(executor: E) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, String>("SELECT value FROM app_meta WHERE key = ?")
        .bind(LOCAL_LAST_CHANGE_AT)
        .fetch_optional(executor)
        .await
}

/// Record a local change at the current time.
pub async fn touch<'e, E>(executor: E) -> Result<ChangeStamp, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = ChangeStamp::now();
    touch_at(executor, now).await?;
    Ok(now)
}

/// Shape of a stamp written by [`ChangeStamp::to_iso`], as a SQLite GLOB.
const STAMP_GLOB: &str = "[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]T\
                          [0-9][0-9]:[0-9][0-9]:[0-9][0-9].[0-9][0-9][0-9]Z";

/// Advance the local change stamp to `stamp`. Never moves a well-formed
/// stamp backwards.
pub async fn touch_at<'e, E>(executor: E, stamp: ChangeStamp) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO app_meta (key, value) VALUES (?, ?)
        ON CONFLICT (key) DO UPDATE SET value = CASE
            WHEN value GLOB ? THEN MAX(value, excluded.value)
            ELSE excluded.value
        END
        "#,
    )
    .bind(LOCAL_LAST_CHANGE_AT)
    .bind(stamp.to_iso())
    .bind(STAMP_GLOB)
    .execute(executor)
    .await?;

    Ok(())
}

/// Install `new` as the local change stamp only if it still holds `expected`.
///
/// Returns false when a local write replaced the stamp in the meantime.
pub async fn compare_and_set<'e, E>(
    executor: E,
    expected: Option<&str>,
    new: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = match expected {
        Some(expected) => {
            sqlx::query("UPDATE app_meta SET value = ? WHERE key = ? AND value = ?")
                .bind(new)
                .bind(LOCAL_LAST_CHANGE_AT)
                .bind(expected)
                .execute(executor)
                .await?
        }
        None => {
            sqlx::query(
                "INSERT INTO app_meta (key, value) VALUES (?, ?) ON CONFLICT (key) DO NOTHING",
            )
            .bind(LOCAL_LAST_CHANGE_AT)
            .bind(new)
            .execute(executor)
            .await?
        }
    };

    Ok(result.rows_affected() == 1)
}
