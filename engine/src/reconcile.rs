//! Timestamp reconciliation and the per-cycle plan.
//!
//! # Algorithm
//!
//! 1. Run the [`BootstrapGuard`] on both snapshot shapes
//! 2. If it picked a structural path, that path is the plan
//! 3. Otherwise compare the two change stamps with a dead-band
//! 4. Newer side wins the whole dataset; equal (within the band) is a no-op
//!
//! This is last-writer-wins at the granularity of the entire dataset. Any
//! local write, however small, makes the whole local dataset the upload
//! candidate.

use crate::bootstrap::{BootstrapDecision, BootstrapGuard};
use crate::snapshot::ShapeSummary;
use crate::ChangeStamp;

/// Stamps closer than this are treated as equal.
pub const DEAD_BAND_MS: u64 = 2000;

/// Result of comparing the two change stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    InSync,
    Upload,
    Download,
}

pub struct ConflictResolver;

impl ConflictResolver {
    pub fn resolve(local: ChangeStamp, remote: ChangeStamp) -> Resolution {
        if local.abs_diff_ms(remote) < DEAD_BAND_MS {
            Resolution::InSync
        } else if local > remote {
            Resolution::Upload
        } else {
            Resolution::Download
        }
    }
}

/// Why a download was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadReason {
    SeededBootstrap,
    EmptyClient,
    RemoteNewer,
}

/// What a cycle will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Replace local transactional data with the remote snapshot.
    Download(DownloadReason),
    /// Publish the whole local snapshot to an empty remote.
    Migrate,
    /// Publish the whole local snapshot because it is newer.
    Upload,
    InSync,
}

impl SyncAction {
    pub fn is_download(self) -> bool {
        matches!(self, SyncAction::Download(_))
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SyncAction::Download(DownloadReason::SeededBootstrap) => "download (seeded bootstrap)",
            SyncAction::Download(DownloadReason::EmptyClient) => "download (empty client)",
            SyncAction::Download(DownloadReason::RemoteNewer) => "download (remote newer)",
            SyncAction::Migrate => "initial migration",
            SyncAction::Upload => "upload",
            SyncAction::InSync => "in sync",
        };
        f.write_str(label)
    }
}

pub struct SyncPlan;

impl SyncPlan {
    /// Structural cases are settled before any stamp is looked at. Past
    /// bootstrap, a side whose stamp could not be read counts as the oldest.
    pub fn plan(local: &ShapeSummary, remote: &ShapeSummary) -> SyncAction {
        match BootstrapGuard::decide(local, remote) {
            BootstrapDecision::SeededDownload => {
                SyncAction::Download(DownloadReason::SeededBootstrap)
            }
            BootstrapDecision::SafetyDownload => SyncAction::Download(DownloadReason::EmptyClient),
            BootstrapDecision::InitialMigration => SyncAction::Migrate,
            BootstrapDecision::Normal => {
                let local_stamp = local.stamp.unwrap_or(ChangeStamp::EPOCH);
                let remote_stamp = remote.stamp.unwrap_or(ChangeStamp::EPOCH);
                match ConflictResolver::resolve(local_stamp, remote_stamp) {
                    Resolution::InSync => SyncAction::InSync,
                    Resolution::Upload => SyncAction::Upload,
                    Resolution::Download => SyncAction::Download(DownloadReason::RemoteNewer),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: i64) -> ChangeStamp {
        ChangeStamp::from_millis(millis)
    }

    fn shape(has_projects: bool, millis: i64) -> ShapeSummary {
        ShapeSummary {
            has_projects,
            catalogs_populated: true,
            stamp: Some(at(millis)),
        }
    }

    #[test]
    fn within_dead_band_is_in_sync() {
        assert_eq!(ConflictResolver::resolve(at(10_000), at(11_999)), Resolution::InSync);
        assert_eq!(ConflictResolver::resolve(at(11_999), at(10_000)), Resolution::InSync);
        assert_eq!(ConflictResolver::resolve(at(10_000), at(10_000)), Resolution::InSync);
    }

    #[test]
    fn band_edge_is_exclusive() {
        assert_eq!(ConflictResolver::resolve(at(12_000), at(10_000)), Resolution::Upload);
        assert_eq!(ConflictResolver::resolve(at(10_000), at(12_000)), Resolution::Download);
    }

    #[test]
    fn newer_local_uploads() {
        assert_eq!(ConflictResolver::resolve(at(50_000), at(0)), Resolution::Upload);
    }

    #[test]
    fn newer_remote_downloads() {
        assert_eq!(ConflictResolver::resolve(at(0), at(50_000)), Resolution::Download);
    }

    #[test]
    fn guard_takes_priority_over_stamps() {
        // Local is far newer but empty: still downloads.
        let action = SyncPlan::plan(&shape(false, 90_000), &shape(true, 0));
        assert_eq!(action, SyncAction::Download(DownloadReason::SeededBootstrap));

        // Remote is far newer but empty: still migrates.
        let action = SyncPlan::plan(&shape(true, 0), &shape(false, 90_000));
        assert_eq!(action, SyncAction::Migrate);
    }

    #[test]
    fn unseeded_empty_client_downloads() {
        let local = ShapeSummary {
            has_projects: false,
            catalogs_populated: false,
            stamp: Some(at(0)),
        };
        let action = SyncPlan::plan(&local, &shape(true, 5));
        assert_eq!(action, SyncAction::Download(DownloadReason::EmptyClient));
        assert!(action.is_download());
    }

    #[test]
    fn normal_path_uses_stamps() {
        assert_eq!(SyncPlan::plan(&shape(true, 9_000), &shape(true, 1_000)), SyncAction::Upload);
        assert_eq!(
            SyncPlan::plan(&shape(true, 1_000), &shape(true, 9_000)),
            SyncAction::Download(DownloadReason::RemoteNewer)
        );
        assert_eq!(SyncPlan::plan(&shape(true, 1_000), &shape(true, 1_500)), SyncAction::InSync);
    }

    #[test]
    fn unreadable_stamp_does_not_block_bootstrap() {
        let unreadable = ShapeSummary {
            stamp: None,
            ..shape(true, 0)
        };
        let action = SyncPlan::plan(&shape(false, 90_000), &unreadable);
        assert_eq!(action, SyncAction::Download(DownloadReason::SeededBootstrap));

        let local = ShapeSummary {
            stamp: None,
            ..shape(true, 0)
        };
        assert_eq!(SyncPlan::plan(&local, &shape(false, 0)), SyncAction::Migrate);
    }

    #[test]
    fn unreadable_stamp_counts_as_oldest() {
        let unreadable = ShapeSummary {
            stamp: None,
            ..shape(true, 0)
        };
        assert_eq!(SyncPlan::plan(&shape(true, 60_000), &unreadable), SyncAction::Upload);
        assert_eq!(
            SyncPlan::plan(&unreadable, &shape(true, 60_000)),
            SyncAction::Download(DownloadReason::RemoteNewer)
        );
    }

    #[test]
    fn both_empty_compare_stamps() {
        assert_eq!(SyncPlan::plan(&shape(false, 0), &shape(false, 0)), SyncAction::InSync);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_resolution_is_antisymmetric(
                a in 0i64..10_000_000,
                b in 0i64..10_000_000,
            ) {
                let forward = ConflictResolver::resolve(at(a), at(b));
                let backward = ConflictResolver::resolve(at(b), at(a));
                let mirrored = match forward {
                    Resolution::InSync => Resolution::InSync,
                    Resolution::Upload => Resolution::Download,
                    Resolution::Download => Resolution::Upload,
                };
                prop_assert_eq!(backward, mirrored);
            }

            #[test]
            fn prop_dead_band_never_moves_data(base in 0i64..10_000_000, delta in 0i64..2_000) {
                let resolution = ConflictResolver::resolve(at(base), at(base + delta));
                prop_assert_eq!(resolution, Resolution::InSync);
            }

            #[test]
            fn prop_populated_sides_never_bypass_stamps(
                a in 0i64..10_000_000,
                b in 0i64..10_000_000,
            ) {
                let action = SyncPlan::plan(&shape(true, a), &shape(true, b));
                prop_assert!(action != SyncAction::Migrate);
                let structural = matches!(
                    action,
                    SyncAction::Download(
                        DownloadReason::EmptyClient | DownloadReason::SeededBootstrap
                    )
                );
                prop_assert!(!structural);
            }
        }
    }
}
