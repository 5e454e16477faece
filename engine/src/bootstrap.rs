//! Bootstrap guard: structural decisions taken before any timestamp comparison.
//!
//! Replacing a whole side is irreversible, so the asymmetric cases (one side
//! holds projects, the other holds none) are decided from the presence of
//! data alone. A brand-new client has the oldest possible stamp and a stale
//! stamp on a populated side must never cause that side to be wiped.

use crate::snapshot::ShapeSummary;

/// Outcome of the guard, evaluated in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapDecision {
    /// Local has no projects but a full seeded catalog; remote has projects.
    SeededDownload,
    /// Local has no projects; remote has projects.
    SafetyDownload,
    /// Local has projects; remote has none. Publish everything.
    InitialMigration,
    /// No asymmetry: defer to the timestamp comparison.
    Normal,
}

impl BootstrapDecision {
    /// Both download variants take the same path; they differ only in label.
    pub fn is_download(self) -> bool {
        matches!(
            self,
            BootstrapDecision::SeededDownload | BootstrapDecision::SafetyDownload
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            BootstrapDecision::SeededDownload => "seeded-bootstrap",
            BootstrapDecision::SafetyDownload => "empty-client",
            BootstrapDecision::InitialMigration => "initial-migration",
            BootstrapDecision::Normal => "normal",
        }
    }
}

impl std::fmt::Display for BootstrapDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub struct BootstrapGuard;

impl BootstrapGuard {
    pub fn decide(local: &ShapeSummary, remote: &ShapeSummary) -> BootstrapDecision {
        match (local.has_projects, remote.has_projects) {
            (false, true) if local.catalogs_populated => BootstrapDecision::SeededDownload,
            (false, true) => BootstrapDecision::SafetyDownload,
            (true, false) => BootstrapDecision::InitialMigration,
            _ => BootstrapDecision::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChangeStamp;

    fn shape(has_projects: bool, catalogs_populated: bool, millis: i64) -> ShapeSummary {
        ShapeSummary {
            has_projects,
            catalogs_populated,
            stamp: Some(ChangeStamp::from_millis(millis)),
        }
    }

    #[test]
    fn seeded_machine_downloads() {
        let decision = BootstrapGuard::decide(&shape(false, true, 0), &shape(true, true, 10));
        assert_eq!(decision, BootstrapDecision::SeededDownload);
        assert!(decision.is_download());
    }

    #[test]
    fn empty_machine_downloads_even_with_newer_stamp() {
        // A fresh install that touched its stamp while seeding must still download.
        let decision =
            BootstrapGuard::decide(&shape(false, false, 9_000_000), &shape(true, false, 10));
        assert_eq!(decision, BootstrapDecision::SafetyDownload);
        assert!(decision.is_download());
    }

    #[test]
    fn populated_local_migrates_to_empty_remote() {
        let decision = BootstrapGuard::decide(&shape(true, true, 0), &shape(false, true, 9_000));
        assert_eq!(decision, BootstrapDecision::InitialMigration);
        assert!(!decision.is_download());
    }

    #[test]
    fn symmetric_states_are_normal() {
        assert_eq!(
            BootstrapGuard::decide(&shape(true, true, 1), &shape(true, true, 2)),
            BootstrapDecision::Normal
        );
        assert_eq!(
            BootstrapGuard::decide(&shape(false, true, 1), &shape(false, false, 2)),
            BootstrapDecision::Normal
        );
    }
}
