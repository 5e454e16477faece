//! Row types for the tracked entities and their natural keys.
//!
//! Catalog rows (municipalities, institutions, sites, indicators) are matched
//! across stores by value, never by surrogate id. Transactional rows
//! (projects, activities, tracking entries) carry a `sync_uid` that is the
//! durable cross-store identity.

use crate::{RowId, SyncUid};
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Key of the metadata subtree in the remote tree.
pub const META_KEY: &str = "meta";

/// Field holding the remote change stamp inside the metadata subtree.
pub const REMOTE_STAMP_FIELD: &str = "last_change_at";

/// The seven synced tables, in parent-to-child order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Municipalities,
    Institutions,
    Sites,
    Indicators,
    Projects,
    Activities,
    TrackingEntries,
}

impl Table {
    /// All tables, parents before children.
    pub const ALL: [Table; 7] = [
        Table::Municipalities,
        Table::Institutions,
        Table::Sites,
        Table::Indicators,
        Table::Projects,
        Table::Activities,
        Table::TrackingEntries,
    ];

    /// Name of the table, both locally and as a remote subtree key.
    pub fn name(self) -> &'static str {
        match self {
            Table::Municipalities => "municipalities",
            Table::Institutions => "institutions",
            Table::Sites => "sites",
            Table::Indicators => "indicators",
            Table::Projects => "projects",
            Table::Activities => "activities",
            Table::TrackingEntries => "tracking_entries",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Municipality {
    pub id: RowId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub id: RowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality_id: Option<RowId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: RowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<RowId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: RowId,
    pub name: String,
}

/// A funded project. Unique by BPIN code when it has one, else by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: RowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpin_code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub contract_year: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contractor: Option<String>,
    #[serde(default)]
    pub initial_value: f64,
    #[serde(default)]
    pub value_rp: f64,
    #[serde(default)]
    pub value_sgp: f64,
    #[serde(default)]
    pub value_men: f64,
    #[serde(default)]
    pub value_sgr: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_uid: Option<SyncUid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: RowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<RowId>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_uid: Option<SyncUid>,
}

/// One progress observation of a project at a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub id: RowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<RowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<RowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<RowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator_id: Option<RowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracked_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_addition: bool,
    #[serde(default)]
    pub addition_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addition_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_uid: Option<SyncUid>,
}

/// Accepts `true`/`false` as well as the `0`/`1` integers older clients wrote.
fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        serde_json::Value::String(s) => Ok(matches!(s.trim(), "1" | "true" | "TRUE")),
        _ => Ok(false),
    }
}

/// Normalize a display name for natural-key comparison.
///
/// Trims, strips diacritics, uppercases and collapses inner whitespace, so
/// `" Institución  Central"` and `"INSTITUCION CENTRAL"` compare equal.
pub fn normalize_name(raw: &str) -> String {
    let stripped: String = raw.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Returns the trimmed string, or `None` when it is empty.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Funding source recorded when a project has neither components nor a
/// manual source.
pub const UNDEFINED_FUNDING: &str = "SIN DEFINIR";

/// The four funding components of a project, in display order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FundingSplit {
    pub rp: f64,
    pub sgp: f64,
    pub men: f64,
    pub sgr: f64,
}

impl FundingSplit {
    const LABELS: [&'static str; 4] = ["R.P.", "S.G.P.", "MEN", "S.G.R."];

    fn values(&self) -> [f64; 4] {
        [self.rp, self.sgp, self.men, self.sgr]
    }

    fn total(&self) -> f64 {
        self.values().iter().sum()
    }

    /// Initial value and funding source of a new project.
    ///
    /// A positive component total wins over the manual figures, and the
    /// source lists every positive component. Otherwise the manual total is
    /// kept and the manual source is uppercased.
    pub fn resolve(&self, manual_total: f64, manual_source: Option<&str>) -> (f64, String) {
        let total = self.total();
        if total > 0.0 {
            let labels: Vec<&str> = Self::LABELS
                .iter()
                .zip(self.values())
                .filter(|(_, value)| *value > 0.0)
                .map(|(label, _)| *label)
                .collect();
            return (total, labels.join(" + "));
        }
        let source = non_empty(manual_source)
            .map(str::to_uppercase)
            .unwrap_or_else(|| UNDEFINED_FUNDING.to_string());
        (manual_total, source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MunicipalityKey(pub String);

/// Institution identity: its name within a (local) municipality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstitutionKey {
    pub name: String,
    pub municipality: Option<RowId>,
}

/// Site identity: its name within a (local) institution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    pub name: String,
    pub institution: Option<RowId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndicatorKey(pub String);

/// Project identity: code when present, otherwise the normalized name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProjectKey {
    Code(String),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityKey {
    pub project: Option<RowId>,
    pub description: String,
}

/// Value identity of a tracking entry that has no `sync_uid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryTuple {
    pub project: Option<RowId>,
    pub site: Option<RowId>,
    pub indicator: Option<RowId>,
    pub tracked_on: Option<String>,
    pub activity: Option<RowId>,
}

impl Municipality {
    pub fn key(&self) -> MunicipalityKey {
        MunicipalityKey(normalize_name(&self.name))
    }
}

impl Institution {
    /// Key under an already-resolved local municipality id.
    pub fn key_under(&self, municipality: Option<RowId>) -> InstitutionKey {
        InstitutionKey {
            name: normalize_name(&self.name),
            municipality,
        }
    }
}

impl Site {
    /// Key under an already-resolved local institution id.
    pub fn key_under(&self, institution: Option<RowId>) -> SiteKey {
        SiteKey {
            name: normalize_name(&self.name),
            institution,
        }
    }
}

impl Indicator {
    pub fn key(&self) -> IndicatorKey {
        IndicatorKey(normalize_name(&self.name))
    }
}

impl Project {
    pub fn key(&self) -> ProjectKey {
        match non_empty(self.bpin_code.as_deref()) {
            Some(code) => ProjectKey::Code(code.to_string()),
            None => ProjectKey::Name(normalize_name(&self.name)),
        }
    }
}

impl Activity {
    pub fn key(&self) -> ActivityKey {
        ActivityKey {
            project: self.project_id,
            description: normalize_name(&self.description),
        }
    }
}

impl TrackingEntry {
    pub fn tuple(&self) -> EntryTuple {
        EntryTuple {
            project: self.project_id,
            site: self.site_id,
            indicator: self.indicator_id,
            tracked_on: non_empty(self.tracked_on.as_deref()).map(str::to_string),
            activity: self.activity_id,
        }
    }

    /// The stable identifier, if the row carries a usable one.
    pub fn stable_uid(&self) -> Option<&str> {
        non_empty(self.sync_uid.as_deref())
    }
}
