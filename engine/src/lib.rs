//! # FieldTrack Engine
//!
//! Deterministic decision logic for whole-snapshot bidirectional sync between
//! a per-machine local store and one shared remote JSON tree.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches a database or the network
//! - **Deterministic**: the same snapshots always produce the same plan
//! - **Testable**: pure functions over plain data
//!
//! ## Core Concepts
//!
//! ### Snapshots
//!
//! Each cycle reads one complete [`LocalSnapshot`] and one complete
//! [`RemoteSnapshot`]. Every decision is taken over whole snapshots, never
//! over individual rows.
//!
//! ### Bootstrap Guard
//!
//! The [`BootstrapGuard`] handles the asymmetric cases first (one side has
//! projects, the other none). They are decided structurally because a new
//! client's stamp is always the oldest.
//!
//! ### Conflict Resolution
//!
//! Otherwise the [`ConflictResolver`] compares the two [`ChangeStamp`]s with
//! a 2 second dead-band: the newer side wins the whole dataset.
//!
//! ### Upload and Merge
//!
//! [`build_patch`] turns the local dataset into one top-level patch of the
//! remote tree. [`MergePlan`] turns a remote snapshot into the rows a
//! download writes locally: catalogs matched by natural key, transactional
//! rows replaced with their references remapped and duplicates suppressed.
//!
//! ## Quick Start
//!
//! ```rust
//! use fieldtrack_engine::{
//!     ChangeStamp, Dataset, LocalSnapshot, RemoteSnapshot, SyncAction, SyncPlan,
//! };
//! use serde_json::json;
//!
//! let local = LocalSnapshot::new(Dataset::new(), None);
//! let remote = RemoteSnapshot::from_tree(json!({
//!     "meta": {"last_change_at": "2024-05-01T12:00:00.000Z"},
//!     "projects": {"p-1": {"id": 1, "name": "AULAS", "sync_uid": "p-1"}}
//! }))
//! .unwrap();
//!
//! let action = SyncPlan::plan(&local.shape(), &remote.shape());
//! assert!(action.is_download());
//! assert!(remote.stamp().unwrap() > ChangeStamp::EPOCH);
//! ```

pub mod bootstrap;
pub mod error;
pub mod merge;
pub mod model;
pub mod reconcile;
pub mod snapshot;
pub mod stamp;
pub mod upload;

// Re-export main types at crate root
pub use bootstrap::{BootstrapDecision, BootstrapGuard};
pub use error::Error;
pub use merge::{
    derived_uid, CatalogIndex, CatalogInsert, CatalogMapping, MergePlan, ReplacementPlan,
};
pub use model::{
    normalize_name, Activity, FundingSplit, Indicator, Institution, Municipality, Project, Site,
    Table, TrackingEntry,
};
pub use reconcile::{
    ConflictResolver, DownloadReason, Resolution, SyncAction, SyncPlan, DEAD_BAND_MS,
};
pub use snapshot::{Dataset, LocalSnapshot, RemoteSnapshot, ShapeSummary, SkippedRow};
pub use stamp::ChangeStamp;
pub use upload::{build_patch, strip_nulls, RemotePatch, RemoteRow};

/// Surrogate integer id, local to one store.
pub type RowId = i64;
/// Stable cross-store identifier of a transactional row.
pub type SyncUid = String;
