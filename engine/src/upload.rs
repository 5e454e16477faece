//! Upload payload construction.
//!
//! The whole local dataset is published as one top-level patch of the
//! remote tree. Each table subtree is replaced wholesale by the patch, so
//! the payload always carries every row.

use crate::model::{
    non_empty, Activity, Indicator, Institution, Municipality, Project, Site, Table,
    TrackingEntry, META_KEY, REMOTE_STAMP_FIELD,
};
use crate::snapshot::Dataset;
use crate::{error::Result, ChangeStamp, Error, RowId};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A row that can be written under a key of the remote tree.
pub trait RemoteRow: Serialize {
    fn row_id(&self) -> RowId;

    /// Stable identifier, when the entity has one.
    fn sync_uid(&self) -> Option<&str> {
        None
    }

    /// Key of the row in its table subtree.
    fn remote_key(&self) -> String {
        match non_empty(self.sync_uid()) {
            Some(uid) => uid.to_string(),
            None => format!("id_{}", self.row_id()),
        }
    }
}

macro_rules! catalog_row {
    ($($ty:ty),*) => {
        $(impl RemoteRow for $ty {
            fn row_id(&self) -> RowId {
                self.id
            }
        })*
    };
}

macro_rules! keyed_row {
    ($($ty:ty),*) => {
        $(impl RemoteRow for $ty {
            fn row_id(&self) -> RowId {
                self.id
            }

            fn sync_uid(&self) -> Option<&str> {
                self.sync_uid.as_deref()
            }
        })*
    };
}

catalog_row!(Municipality, Institution, Site, Indicator);
keyed_row!(Project, Activity, TrackingEntry);

/// Top-level patch of the remote tree: `meta` plus one object per table.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePatch(BTreeMap<String, Value>);

impl RemotePatch {
    /// The stamp this patch will publish.
    pub fn stamp(&self) -> Option<&str> {
        self.0
            .get(META_KEY)
            .and_then(|meta| meta.get(REMOTE_STAMP_FIELD))
            .and_then(Value::as_str)
    }

    pub fn row_count(&self, table: Table) -> usize {
        self.0
            .get(table.name())
            .and_then(Value::as_object)
            .map_or(0, Map::len)
    }

    pub fn subtrees(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0.into_iter().collect())
    }
}

/// Serialize the full dataset into one patch stamped with `now`.
pub fn build_patch(dataset: &Dataset, now: ChangeStamp) -> Result<RemotePatch> {
    let mut subtrees = BTreeMap::new();
    let mut meta = Map::new();
    meta.insert(REMOTE_STAMP_FIELD.to_string(), Value::String(now.to_iso()));
    subtrees.insert(META_KEY.to_string(), Value::Object(meta));
    subtrees.insert(
        Table::Municipalities.name().to_string(),
        table_subtree(Table::Municipalities, &dataset.municipalities)?,
    );
    subtrees.insert(
        Table::Institutions.name().to_string(),
        table_subtree(Table::Institutions, &dataset.institutions)?,
    );
    subtrees.insert(
        Table::Sites.name().to_string(),
        table_subtree(Table::Sites, &dataset.sites)?,
    );
    subtrees.insert(
        Table::Indicators.name().to_string(),
        table_subtree(Table::Indicators, &dataset.indicators)?,
    );
    subtrees.insert(
        Table::Projects.name().to_string(),
        table_subtree(Table::Projects, &dataset.projects)?,
    );
    subtrees.insert(
        Table::Activities.name().to_string(),
        table_subtree(Table::Activities, &dataset.activities)?,
    );
    subtrees.insert(
        Table::TrackingEntries.name().to_string(),
        table_subtree(Table::TrackingEntries, &dataset.tracking_entries)?,
    );
    Ok(RemotePatch(subtrees))
}

fn table_subtree<T: RemoteRow>(table: Table, rows: &[T]) -> Result<Value> {
    let mut subtree = Map::with_capacity(rows.len());
    for row in rows {
        let value = serde_json::to_value(row).map_err(|e| Error::InvalidRow {
            table: table.name().to_string(),
            reason: e.to_string(),
        })?;
        subtree.insert(row.remote_key(), strip_nulls(value));
    }
    Ok(Value::Object(subtree))
}

/// Remove `null` members from objects, recursively. Arrays keep their length.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new();
        dataset.municipalities.push(Municipality {
            id: 1,
            name: "NEIVA".into(),
        });
        dataset.projects.push(Project {
            id: 4,
            bpin_code: None,
            name: "AULAS".into(),
            contract_year: 2024,
            contractor: None,
            initial_value: 100.0,
            value_rp: 0.0,
            value_sgp: 0.0,
            value_men: 0.0,
            value_sgr: 0.0,
            funding_source: None,
            sync_uid: Some("p-1".into()),
        });
        dataset.activities.push(Activity {
            id: 2,
            project_id: Some(4),
            description: "OBRA".into(),
            sync_uid: None,
        });
        dataset
    }

    #[test]
    fn keys_prefer_sync_uid() {
        let patch = build_patch(&dataset(), ChangeStamp::from_millis(0)).unwrap();
        let value = patch.into_value();
        assert!(value["projects"].get("p-1").is_some());
        assert!(value["activities"].get("id_2").is_some());
        assert!(value["municipalities"].get("id_1").is_some());
    }

    #[test]
    fn patch_carries_stamp_and_every_table() {
        let now = ChangeStamp::from_millis(1_709_287_200_250);
        let patch = build_patch(&dataset(), now).unwrap();
        assert_eq!(patch.stamp(), Some("2024-03-01T10:00:00.250Z"));
        assert_eq!(patch.subtrees().count(), 8);
        assert_eq!(patch.row_count(Table::Projects), 1);
        assert_eq!(patch.row_count(Table::TrackingEntries), 0);
    }

    #[test]
    fn rows_have_no_null_members() {
        let patch = build_patch(&dataset(), ChangeStamp::EPOCH).unwrap();
        let value = patch.into_value();
        let project = value["projects"]["p-1"].as_object().unwrap();
        assert!(project.values().all(|v| !v.is_null()));
        assert!(!project.contains_key("bpin_code"));
    }

    #[test]
    fn strip_nulls_is_recursive() {
        let value = json!({"a": null, "b": {"c": null, "d": 1}, "e": [null, {"f": null}]});
        assert_eq!(strip_nulls(value), json!({"b": {"d": 1}, "e": [null, {}]}));
    }

    #[test]
    fn blank_uid_falls_back_to_id_key() {
        let activity = Activity {
            id: 9,
            project_id: None,
            description: "X".into(),
            sync_uid: Some(" ".into()),
        };
        assert_eq!(activity.remote_key(), "id_9");
    }
}
