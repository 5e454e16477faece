//! The sync cycle.

use super::SyncError;
use crate::db::{self, meta, Pool};
use crate::remote::RemoteStore;
use fieldtrack_engine::{
    build_patch, ChangeStamp, DownloadReason, LocalSnapshot, RemoteSnapshot, SyncAction, SyncPlan,
    Table, DEAD_BAND_MS,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of one call to [`SyncCoordinator::run_cycle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle was already running.
    Skipped,
    InSync,
    Uploaded { rows: usize },
    Migrated { rows: usize },
    Downloaded {
        reason: &'static str,
        #[serde(flatten)]
        report: db::MergeReport,
    },
    Failed { error: String },
}

/// The last completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    #[serde(flatten)]
    pub outcome: CycleOutcome,
    pub started_at: String,
    pub finished_at: String,
}

/// Runs sync cycles between the local store and one remote tree.
///
/// At most one cycle runs at a time; a call that finds a cycle in progress
/// returns [`CycleOutcome::Skipped`] immediately.
pub struct SyncCoordinator {
    pool: Pool,
    remote: Arc<dyn RemoteStore>,
    in_progress: AtomicBool,
    last_report: RwLock<Option<CycleReport>>,
}

/// Clears the in-progress flag when dropped.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncCoordinator {
    pub fn new(pool: Pool, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            pool,
            remote,
            in_progress: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// Record a local change. Call after every local mutation that did not
    /// already touch the stamp in its own transaction.
    pub async fn touch_local_change(&self) -> Result<ChangeStamp, sqlx::Error> {
        meta::touch(&self.pool).await
    }

    /// Run one cycle to completion. Never fails: errors are logged and
    /// reported as [`CycleOutcome::Failed`].
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.in_progress) else {
            tracing::debug!("sync cycle already in progress, skipping");
            return CycleOutcome::Skipped;
        };

        let started_at = ChangeStamp::now();
        let outcome = match self.cycle().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "sync cycle aborted");
                CycleOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        *self.last_report.write().await = Some(CycleReport {
            outcome: outcome.clone(),
            started_at: started_at.to_iso(),
            finished_at: ChangeStamp::now().to_iso(),
        });
        outcome
    }

    async fn cycle(&self) -> Result<CycleOutcome, SyncError> {
        let local = db::read_local_snapshot(&self.pool).await?;
        let remote = RemoteSnapshot::from_tree(self.remote.read_snapshot().await?)?;
        for row in &remote.skipped {
            tracing::warn!(
                table = %row.table,
                key = %row.key,
                reason = %row.reason,
                "skipping undecodable remote row"
            );
        }

        let local_shape = local.shape();
        let remote_shape = remote.shape();
        if local_shape.stamp.is_none() {
            tracing::warn!(value = ?local.last_change_at, "unreadable local change stamp");
        }
        if remote_shape.stamp.is_none() {
            tracing::warn!(value = ?remote.last_change_at, "unreadable remote change stamp");
        }
        let action = SyncPlan::plan(&local_shape, &remote_shape);
        tracing::info!(
            action = %action,
            local_stamp = ?local_shape.stamp,
            remote_stamp = ?remote_shape.stamp,
            local_projects = local.dataset.count(Table::Projects),
            remote_projects = remote.dataset.count(Table::Projects),
            "sync decision"
        );

        match action {
            SyncAction::InSync => Ok(CycleOutcome::InSync),
            SyncAction::Download(reason) => self.download(&local, &remote, reason).await,
            SyncAction::Migrate => {
                let rows = self.publish(&local).await?;
                Ok(CycleOutcome::Migrated { rows })
            }
            SyncAction::Upload => {
                let rows = self.publish(&local).await?;
                Ok(CycleOutcome::Uploaded { rows })
            }
        }
    }

    /// Write the whole local dataset to the remote, then move the local
    /// baseline to the published stamp.
    async fn publish(&self, local: &LocalSnapshot) -> Result<usize, SyncError> {
        let now = ChangeStamp::now();
        let patch = build_patch(&local.dataset, now)?;
        let rows = local.dataset.total_rows();
        self.remote.patch(patch).await?;
        tracing::info!(rows, stamp = %now, "published local snapshot");

        let published = now.to_iso();
        let expected = local.last_change_at.as_deref();
        if !meta::compare_and_set(&self.pool, expected, &published).await? {
            // A local write landed during the upload. Keep the local side
            // ahead by more than the dead-band so it is published next time.
            let ahead = ChangeStamp::from_millis(now.millis() + DEAD_BAND_MS as i64);
            meta::touch_at(&self.pool, ahead).await?;
            tracing::warn!("local change during upload, another upload is pending");
        }
        Ok(rows)
    }

    async fn download(
        &self,
        local: &LocalSnapshot,
        remote: &RemoteSnapshot,
        reason: DownloadReason,
    ) -> Result<CycleOutcome, SyncError> {
        let label = match reason {
            DownloadReason::SeededBootstrap => "seeded_bootstrap",
            DownloadReason::EmptyClient => "empty_client",
            DownloadReason::RemoteNewer => "remote_newer",
        };
        // The remote stamp becomes the local baseline, so the next cycle
        // lands in the dead-band instead of publishing what was just read.
        // An unreadable remote stamp leaves the baseline at the epoch.
        let baseline = remote.stamp().unwrap_or(ChangeStamp::EPOCH).to_iso();
        let report =
            db::apply_remote(&self.pool, remote, local.last_change_at.as_deref(), &baseline)
                .await?;

        for row in &report.skipped {
            tracing::warn!(
                table = %row.table,
                key = %row.key,
                reason = %row.reason,
                "remote row not merged"
            );
        }
        tracing::info!(
            reason = label,
            projects = report.projects,
            activities = report.activities,
            tracking_entries = report.tracking_entries,
            catalog_inserts = report.catalog_inserts,
            duplicates = report.duplicates,
            "downloaded remote snapshot"
        );

        Ok(CycleOutcome::Downloaded {
            reason: label,
            report,
        })
    }
}
