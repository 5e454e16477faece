//! The shared remote JSON tree.
//!
//! The store is consumed as two whole-tree operations: read the full
//! snapshot, and patch the top level. A patch replaces each named child
//! wholesale and leaves unnamed children alone.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

use crate::sync::SyncError;
use async_trait::async_trait;
use fieldtrack_engine::RemotePatch;
use serde_json::Value;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the whole tree under the configured root. An absent tree is `null`.
    async fn read_snapshot(&self) -> Result<Value, SyncError>;

    /// Apply one top-level patch as a single write.
    async fn patch(&self, patch: RemotePatch) -> Result<(), SyncError>;
}
