//! Background task that runs sync cycles on a timer and on demand.

use super::SyncCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncCommand {
    Trigger,
    Stop,
}

/// Handle to a running sync driver.
///
/// Triggers coalesce: while one is queued, further triggers are dropped,
/// since the queued cycle will observe their changes anyway.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    /// Ask for a cycle as soon as possible. Returns false if the request was
    /// coalesced into one already queued, or the driver has stopped.
    pub fn trigger(&self) -> bool {
        match self.tx.try_send(SyncCommand::Trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("sync already queued, coalescing trigger");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("sync driver has stopped, trigger ignored");
                false
            }
        }
    }

    /// Stop the driver after the current cycle, if any.
    pub async fn stop(&self) {
        let _ = self.tx.send(SyncCommand::Stop).await;
    }
}

/// Spawn the driver. One cycle runs immediately, then one per `interval`
/// and one per accepted trigger.
pub fn spawn_driver(
    coordinator: Arc<SyncCoordinator>,
    interval: Duration,
) -> (SyncHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        coordinator.run_cycle().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    coordinator.run_cycle().await;
                }
                command = rx.recv() => match command {
                    Some(SyncCommand::Trigger) => {
                        coordinator.run_cycle().await;
                    }
                    Some(SyncCommand::Stop) | None => break,
                },
            }
        }
        tracing::info!("sync driver stopped");
    });

    (SyncHandle { tx }, task)
}
