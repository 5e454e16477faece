//! Bidirectional sync between the local store and the remote tree.

mod coordinator;
mod driver;
mod error;

pub use coordinator::{CycleOutcome, CycleReport, SyncCoordinator};
pub use driver::{spawn_driver, SyncHandle};
pub use error::SyncError;
