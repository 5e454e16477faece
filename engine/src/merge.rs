//! Merge planning for a download.
//!
//! A download runs in two phases, both planned here without touching any
//! store:
//!
//! - **Phase A** matches every remote catalog row to a local row with the
//!   same natural key, planning an insert when none exists, and records a
//!   `remote id -> local id` map per catalog.
//! - **Phase B** builds the projects, activities and tracking entries that
//!   replace the local transactional tables, with catalog references
//!   remapped through the Phase A maps and duplicates suppressed.
//!
//! The caller executes the plan inside one local transaction.

use crate::model::{
    non_empty, normalize_name, Activity, ActivityKey, EntryTuple, Indicator, IndicatorKey,
    Institution, InstitutionKey, Municipality, MunicipalityKey, Project, ProjectKey, Site,
    SiteKey, Table, TrackingEntry,
};
use crate::snapshot::{Dataset, RemoteSnapshot, SkippedRow};
use crate::upload::RemoteRow;
use crate::{RowId, SyncUid};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Remote surrogate id to local surrogate id.
pub type IdMap = BTreeMap<RowId, RowId>;

/// Deterministic identifier for a remote row that arrived without one.
///
/// Derived from the table and the row's remote key, so every client that
/// merges the same payload assigns the same value.
pub fn derived_uid(table: Table, remote_key: &str) -> SyncUid {
    let name = format!("fieldtrack/{}/{}", table.name(), remote_key);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// A catalog row Phase A decided to create locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogInsert {
    Municipality(Municipality),
    Institution(Institution),
    Site(Site),
    Indicator(Indicator),
}

impl CatalogInsert {
    pub fn table(&self) -> Table {
        match self {
            CatalogInsert::Municipality(_) => Table::Municipalities,
            CatalogInsert::Institution(_) => Table::Institutions,
            CatalogInsert::Site(_) => Table::Sites,
            CatalogInsert::Indicator(_) => Table::Indicators,
        }
    }
}

/// Result of Phase A.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogMapping {
    pub municipalities: IdMap,
    pub institutions: IdMap,
    pub sites: IdMap,
    pub indicators: IdMap,
    /// Rows to insert, parents before children.
    pub inserts: Vec<CatalogInsert>,
    /// Remote rows that could not be placed.
    pub skipped: Vec<SkippedRow>,
}

impl CatalogMapping {
    pub fn inserted(&self, table: Table) -> usize {
        self.inserts.iter().filter(|i| i.table() == table).count()
    }
}

/// Natural keys of one catalog, plus the next free surrogate id.
#[derive(Debug, Clone)]
struct KeyIndex<K> {
    ids: BTreeMap<K, RowId>,
    next: RowId,
}

impl<K: Ord> KeyIndex<K> {
    fn build(rows: impl Iterator<Item = (K, RowId)>) -> Self {
        let mut index = Self {
            ids: BTreeMap::new(),
            next: 1,
        };
        for (key, id) in rows {
            // Lowest id wins when the local store already holds duplicates.
            index.ids.entry(key).or_insert(id);
            index.next = index.next.max(id + 1);
        }
        index
    }

    /// The local id for `key`, allocating one when absent. The flag is true
    /// for a new allocation.
    fn resolve(&mut self, key: K) -> (RowId, bool) {
        if let Some(id) = self.ids.get(&key) {
            return (*id, false);
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(key, id);
        (id, true)
    }
}

/// Local catalogs indexed by natural key.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    municipalities: KeyIndex<MunicipalityKey>,
    institutions: KeyIndex<InstitutionKey>,
    sites: KeyIndex<SiteKey>,
    indicators: KeyIndex<IndicatorKey>,
}

impl CatalogIndex {
    pub fn from_local(local: &Dataset) -> Self {
        Self {
            municipalities: KeyIndex::build(local.municipalities.iter().map(|r| (r.key(), r.id))),
            institutions: KeyIndex::build(
                local
                    .institutions
                    .iter()
                    .map(|r| (r.key_under(r.municipality_id), r.id)),
            ),
            sites: KeyIndex::build(
                local
                    .sites
                    .iter()
                    .map(|r| (r.key_under(r.institution_id), r.id)),
            ),
            indicators: KeyIndex::build(local.indicators.iter().map(|r| (r.key(), r.id))),
        }
    }

    /// Phase A: resolve every remote catalog row against the local index.
    pub fn reconcile(mut self, remote: &Dataset) -> CatalogMapping {
        let mut mapping = CatalogMapping::default();

        for row in &remote.municipalities {
            if blank(&row.name) {
                mapping.skip(Table::Municipalities, row.id, "blank name");
                continue;
            }
            let (id, created) = self.municipalities.resolve(row.key());
            if created {
                mapping.inserts.push(CatalogInsert::Municipality(Municipality {
                    id,
                    name: row.name.trim().to_string(),
                }));
            }
            mapping.municipalities.insert(row.id, id);
        }

        for row in &remote.institutions {
            if blank(&row.name) {
                mapping.skip(Table::Institutions, row.id, "blank name");
                continue;
            }
            let Ok(municipality) = remap_parent(row.municipality_id, &mapping.municipalities)
            else {
                mapping.skip(Table::Institutions, row.id, "unknown municipality");
                continue;
            };
            let (id, created) = self.institutions.resolve(row.key_under(municipality));
            if created {
                mapping.inserts.push(CatalogInsert::Institution(Institution {
                    id,
                    name: row.name.trim().to_string(),
                    municipality_id: municipality,
                }));
            }
            mapping.institutions.insert(row.id, id);
        }

        for row in &remote.sites {
            if blank(&row.name) {
                mapping.skip(Table::Sites, row.id, "blank name");
                continue;
            }
            let Ok(institution) = remap_parent(row.institution_id, &mapping.institutions) else {
                mapping.skip(Table::Sites, row.id, "unknown institution");
                continue;
            };
            let (id, created) = self.sites.resolve(row.key_under(institution));
            if created {
                mapping.inserts.push(CatalogInsert::Site(Site {
                    id,
                    name: row.name.trim().to_string(),
                    institution_id: institution,
                }));
            }
            mapping.sites.insert(row.id, id);
        }

        for row in &remote.indicators {
            if blank(&row.name) {
                mapping.skip(Table::Indicators, row.id, "blank name");
                continue;
            }
            let (id, created) = self.indicators.resolve(row.key());
            if created {
                mapping.inserts.push(CatalogInsert::Indicator(Indicator {
                    id,
                    name: row.name.trim().to_string(),
                }));
            }
            mapping.indicators.insert(row.id, id);
        }

        mapping
    }
}

impl CatalogMapping {
    fn skip(&mut self, table: Table, id: RowId, reason: &str) {
        self.skipped.push(SkippedRow {
            table,
            key: format!("id_{id}"),
            reason: reason.to_string(),
        });
    }
}

fn blank(name: &str) -> bool {
    name.trim().is_empty()
}

/// Map an optional remote parent id. `Err` means the parent was referenced
/// but is unknown.
fn remap_parent(parent: Option<RowId>, map: &IdMap) -> Result<Option<RowId>, ()> {
    match parent {
        None => Ok(None),
        Some(remote) => map.get(&remote).copied().map(Some).ok_or(()),
    }
}

/// Result of Phase B: the rows that replace the local transactional tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplacementPlan {
    pub projects: Vec<Project>,
    pub activities: Vec<Activity>,
    pub tracking_entries: Vec<TrackingEntry>,
    pub skipped: Vec<SkippedRow>,
    /// Rows suppressed as duplicates of an earlier row.
    pub duplicates: usize,
}

impl ReplacementPlan {
    pub fn build(remote: &RemoteSnapshot, catalogs: &CatalogMapping) -> Self {
        let mut plan = Self::default();
        let projects = plan.plan_projects(&remote.dataset.projects);
        let activities = plan.plan_activities(&remote.dataset.activities, &projects);
        plan.plan_entries(remote, &projects, &activities, catalogs);
        plan
    }

    /// Keeps remote project ids where they are unique. Returns the alias map
    /// from every remote project id to the id of the row that represents it.
    ///
    /// A distinct project that reuses an id already taken gets a fresh one;
    /// children that reference the shared id follow its first holder.
    fn plan_projects(&mut self, projects: &[Project]) -> IdMap {
        let mut alias = IdMap::new();
        let mut ids = IdAllocator::above(projects.iter().map(|p| p.id));
        let mut by_key: BTreeMap<ProjectKey, RowId> = BTreeMap::new();
        let mut by_uid: BTreeMap<SyncUid, RowId> = BTreeMap::new();

        for project in projects {
            if blank(&project.name) && non_empty(project.bpin_code.as_deref()).is_none() {
                self.skip(Table::Projects, project.remote_key(), "neither code nor name");
                continue;
            }
            let key = project.key();
            let uid = stable_or_derived(Table::Projects, project);
            if let Some(existing) = by_uid.get(&uid).or_else(|| by_key.get(&key)) {
                alias.entry(project.id).or_insert(*existing);
                self.duplicates += 1;
                continue;
            }
            let id = ids.claim(project.id);
            by_uid.insert(uid.clone(), id);
            by_key.insert(key, id);
            alias.entry(project.id).or_insert(id);
            self.projects.push(Project {
                id,
                sync_uid: Some(uid),
                ..project.clone()
            });
        }
        alias
    }

    fn plan_activities(&mut self, activities: &[Activity], projects: &IdMap) -> IdMap {
        let mut alias = IdMap::new();
        let mut ids = IdAllocator::above(activities.iter().map(|a| a.id));
        let mut by_key: BTreeMap<ActivityKey, RowId> = BTreeMap::new();
        let mut by_uid: BTreeMap<SyncUid, RowId> = BTreeMap::new();

        for activity in activities {
            if blank(&activity.description) {
                self.skip(Table::Activities, activity.remote_key(), "blank description");
                continue;
            }
            let Some(project) = activity.project_id.and_then(|p| projects.get(&p).copied()) else {
                self.skip(Table::Activities, activity.remote_key(), "unknown project");
                continue;
            };
            let key = ActivityKey {
                project: Some(project),
                description: normalize_name(&activity.description),
            };
            let uid = stable_or_derived(Table::Activities, activity);
            if let Some(existing) = by_uid.get(&uid).or_else(|| by_key.get(&key)) {
                alias.entry(activity.id).or_insert(*existing);
                self.duplicates += 1;
                continue;
            }
            let id = ids.claim(activity.id);
            by_uid.insert(uid.clone(), id);
            by_key.insert(key, id);
            alias.entry(activity.id).or_insert(id);
            self.activities.push(Activity {
                id,
                project_id: Some(project),
                sync_uid: Some(uid),
                ..activity.clone()
            });
        }
        alias
    }

    fn plan_entries(
        &mut self,
        remote: &RemoteSnapshot,
        projects: &IdMap,
        activities: &IdMap,
        catalogs: &CatalogMapping,
    ) {
        let entries = &remote.dataset.tracking_entries;
        let mut ids = IdAllocator::above(entries.iter().map(|e| e.id));
        let mut seen_uids: BTreeSet<SyncUid> = BTreeSet::new();
        let mut seen_tuples: BTreeSet<EntryTuple> = BTreeSet::new();

        for (i, entry) in entries.iter().enumerate() {
            let remote_key = remote
                .entry_keys
                .get(i)
                .cloned()
                .unwrap_or_else(|| entry.remote_key());

            let Some(project) = entry.project_id.and_then(|p| projects.get(&p).copied()) else {
                self.skip(Table::TrackingEntries, remote_key, "unknown project");
                continue;
            };

            let mut row = TrackingEntry {
                project_id: Some(project),
                activity_id: entry.activity_id.and_then(|a| activities.get(&a).copied()),
                site_id: entry.site_id.and_then(|s| catalogs.sites.get(&s).copied()),
                indicator_id: entry
                    .indicator_id
                    .and_then(|ind| catalogs.indicators.get(&ind).copied()),
                ..entry.clone()
            };
            let tuple = row.tuple();

            let uid = match entry.stable_uid() {
                Some(uid) => uid.to_string(),
                None if seen_tuples.contains(&tuple) => {
                    self.duplicates += 1;
                    continue;
                }
                None => derived_uid(Table::TrackingEntries, &remote_key),
            };
            if !seen_uids.insert(uid.clone()) {
                self.duplicates += 1;
                continue;
            }
            seen_tuples.insert(tuple);

            row.id = ids.claim(row.id);
            row.sync_uid = Some(uid);
            self.tracking_entries.push(row);
        }
    }

    fn skip(&mut self, table: Table, key: String, reason: &str) {
        self.skipped.push(SkippedRow {
            table,
            key,
            reason: reason.to_string(),
        });
    }
}

/// Hands out remote ids unchanged until one repeats, then ids above the
/// highest remote id.
struct IdAllocator {
    used: BTreeSet<RowId>,
    next: RowId,
}

impl IdAllocator {
    fn above(ids: impl Iterator<Item = RowId>) -> Self {
        Self {
            used: BTreeSet::new(),
            next: ids.max().unwrap_or(0) + 1,
        }
    }

    fn claim(&mut self, wanted: RowId) -> RowId {
        if self.used.insert(wanted) {
            return wanted;
        }
        let id = self.next;
        self.next += 1;
        self.used.insert(id);
        id
    }
}

fn stable_or_derived<T: RemoteRow>(table: Table, row: &T) -> SyncUid {
    match non_empty(row.sync_uid()) {
        Some(uid) => uid.to_string(),
        None => derived_uid(table, &row.remote_key()),
    }
}

/// Both phases of a download.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    pub catalogs: CatalogMapping,
    pub replacement: ReplacementPlan,
}

impl MergePlan {
    /// Plan the merge of `remote` into a store whose catalogs are `local`.
    pub fn build(local: &Dataset, remote: &RemoteSnapshot) -> Self {
        let catalogs = CatalogIndex::from_local(local).reconcile(&remote.dataset);
        let replacement = ReplacementPlan::build(remote, &catalogs);
        Self {
            catalogs,
            replacement,
        }
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkippedRow> {
        self.catalogs
            .skipped
            .iter()
            .chain(self.replacement.skipped.iter())
    }
}
