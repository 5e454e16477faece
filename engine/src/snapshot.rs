//! Whole-dataset snapshots of the local and remote stores.
//!
//! A snapshot is the unit of comparison and transfer: every cycle reads one
//! snapshot per side, decides from their shape and stamps, and moves a whole
//! snapshot in one direction. Rows are kept sorted by id so that everything
//! derived from a snapshot is deterministic.

use crate::model::{
    Activity, Indicator, Institution, Municipality, Project, Site, Table, TrackingEntry, META_KEY,
    REMOTE_STAMP_FIELD,
};
use crate::{error::Result, ChangeStamp, Error, RowId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The seven synced tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub municipalities: Vec<Municipality>,
    pub institutions: Vec<Institution>,
    pub sites: Vec<Site>,
    pub indicators: Vec<Indicator>,
    pub projects: Vec<Project>,
    pub activities: Vec<Activity>,
    pub tracking_entries: Vec<TrackingEntry>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_projects(&self) -> bool {
        !self.projects.is_empty()
    }

    /// True when all four catalogs hold at least one row.
    pub fn catalogs_populated(&self) -> bool {
        !self.municipalities.is_empty()
            && !self.institutions.is_empty()
            && !self.sites.is_empty()
            && !self.indicators.is_empty()
    }

    pub fn count(&self, table: Table) -> usize {
        match table {
            Table::Municipalities => self.municipalities.len(),
            Table::Institutions => self.institutions.len(),
            Table::Sites => self.sites.len(),
            Table::Indicators => self.indicators.len(),
            Table::Projects => self.projects.len(),
            Table::Activities => self.activities.len(),
            Table::TrackingEntries => self.tracking_entries.len(),
        }
    }

    /// Row counts per table.
    pub fn counts(&self) -> BTreeMap<Table, usize> {
        Table::ALL.iter().map(|t| (*t, self.count(*t))).collect()
    }

    pub fn total_rows(&self) -> usize {
        Table::ALL.iter().map(|t| self.count(*t)).sum()
    }

    /// Sort every table by id.
    pub fn sort_by_id(&mut self) {
        self.municipalities.sort_by_key(|r| r.id);
        self.institutions.sort_by_key(|r| r.id);
        self.sites.sort_by_key(|r| r.id);
        self.indicators.sort_by_key(|r| r.id);
        self.projects.sort_by_key(|r| r.id);
        self.activities.sort_by_key(|r| r.id);
        self.tracking_entries.sort_by_key(|r| r.id);
    }
}

/// What the bootstrap guard needs to know about one side.
///
/// The guard looks only at the two presence flags. `stamp` is `None` when
/// the stored value exists but cannot be parsed; it only matters once both
/// sides are past bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeSummary {
    pub has_projects: bool,
    pub catalogs_populated: bool,
    pub stamp: Option<ChangeStamp>,
}

impl ShapeSummary {
    pub fn of(dataset: &Dataset, stamp: Option<ChangeStamp>) -> Self {
        Self {
            has_projects: dataset.has_projects(),
            catalogs_populated: dataset.catalogs_populated(),
            stamp,
        }
    }
}

/// The full local dataset plus the local change stamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalSnapshot {
    pub dataset: Dataset,
    /// Raw stored value of the local stamp, kept for compare-and-set.
    pub last_change_at: Option<String>,
}

impl LocalSnapshot {
    pub fn new(mut dataset: Dataset, last_change_at: Option<String>) -> Self {
        dataset.sort_by_id();
        Self {
            dataset,
            last_change_at,
        }
    }

    pub fn stamp(&self) -> Result<ChangeStamp> {
        ChangeStamp::parse(self.last_change_at.as_deref())
    }

    pub fn shape(&self) -> ShapeSummary {
        ShapeSummary::of(&self.dataset, self.stamp().ok())
    }
}

/// A remote row that could not be decoded and was left out of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub table: Table,
    pub key: String,
    pub reason: String,
}

/// The full remote tree decoded into a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    pub dataset: Dataset,
    pub last_change_at: Option<String>,
    /// Remote key of each tracking entry, aligned with `dataset.tracking_entries`.
    pub entry_keys: Vec<String>,
    /// Rows that failed to decode.
    pub skipped: Vec<SkippedRow>,
}

impl RemoteSnapshot {
    /// Decode a full remote tree. A `null` tree is an empty remote.
    pub fn from_tree(tree: Value) -> Result<Self> {
        let mut root = match tree {
            Value::Null => return Ok(Self::default()),
            Value::Object(root) => root,
            other => {
                return Err(Error::InvalidTree(format!(
                    "expected an object at the root, got {}",
                    kind(&other)
                )))
            }
        };

        let last_change_at = root
            .get(META_KEY)
            .and_then(|meta| meta.get(REMOTE_STAMP_FIELD))
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut skipped = Vec::new();
        let mut take = |table: Table| -> Result<Vec<(String, Value)>> {
            table_rows(table, root.remove(table.name()).unwrap_or(Value::Null))
        };

        let municipalities = take(Table::Municipalities)?;
        let institutions = take(Table::Institutions)?;
        let sites = take(Table::Sites)?;
        let indicators = take(Table::Indicators)?;
        let projects = take(Table::Projects)?;
        let activities = take(Table::Activities)?;
        let entries = take(Table::TrackingEntries)?;

        let mut dataset = Dataset {
            municipalities: decode_rows(Table::Municipalities, municipalities, &mut skipped),
            institutions: decode_rows(Table::Institutions, institutions, &mut skipped),
            sites: decode_rows(Table::Sites, sites, &mut skipped),
            indicators: decode_rows(Table::Indicators, indicators, &mut skipped),
            projects: decode_rows(Table::Projects, projects, &mut skipped),
            activities: decode_rows(Table::Activities, activities, &mut skipped),
            tracking_entries: Vec::new(),
        };
        dataset.sort_by_id();

        let mut keyed: Vec<(String, TrackingEntry)> =
            decode_keyed_rows(Table::TrackingEntries, entries, &mut skipped);
        keyed.sort_by(|a, b| a.1.id.cmp(&b.1.id).then_with(|| a.0.cmp(&b.0)));
        let (entry_keys, tracking_entries) = keyed.into_iter().unzip();
        dataset.tracking_entries = tracking_entries;

        Ok(Self {
            dataset,
            last_change_at,
            entry_keys,
            skipped,
        })
    }

    pub fn stamp(&self) -> Result<ChangeStamp> {
        ChangeStamp::parse(self.last_change_at.as_deref())
    }

    pub fn shape(&self) -> ShapeSummary {
        ShapeSummary::of(&self.dataset, self.stamp().ok())
    }
}

/// Split one table subtree into `(key, row)` pairs.
///
/// JSON trees return dense integer-keyed children as arrays, so arrays are
/// accepted with their index as key and `null` holes dropped.
fn table_rows(table: Table, value: Value) -> Result<Vec<(String, Value)>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect()),
        other => Err(Error::InvalidTree(format!(
            "table {} is {}, expected an object",
            table,
            kind(&other)
        ))),
    }
}

fn decode_rows<T: DeserializeOwned>(
    table: Table,
    rows: Vec<(String, Value)>,
    skipped: &mut Vec<SkippedRow>,
) -> Vec<T> {
    decode_keyed_rows(table, rows, skipped)
        .into_iter()
        .map(|(_, row)| row)
        .collect()
}

fn decode_keyed_rows<T: DeserializeOwned>(
    table: Table,
    rows: Vec<(String, Value)>,
    skipped: &mut Vec<SkippedRow>,
) -> Vec<(String, T)> {
    let mut out = Vec::with_capacity(rows.len());
    for (key, mut value) in rows {
        if let Value::Object(ref mut fields) = value {
            fill_missing_id(fields, &key);
        }
        match serde_json::from_value::<T>(value) {
            Ok(row) => out.push((key, row)),
            Err(e) => skipped.push(SkippedRow {
                table,
                key,
                reason: e.to_string(),
            }),
        }
    }
    out
}

/// Rows written under a synthesized `id_<n>` key may omit the id field.
fn fill_missing_id(fields: &mut Map<String, Value>, key: &str) {
    if fields.get("id").is_some_and(|id| !id.is_null()) {
        return;
    }
    if let Some(id) = key
        .strip_prefix("id_")
        .and_then(|n| n.parse::<RowId>().ok())
    {
        fields.insert("id".to_string(), Value::from(id));
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
