//! In-process remote tree.

use super::RemoteStore;
use crate::sync::SyncError;
use async_trait::async_trait;
use fieldtrack_engine::RemotePatch;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A remote tree held in memory, with the same top-level patch semantics as
/// the HTTP store. Clones share the tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    tree: Arc<RwLock<Value>>,
    failing: Arc<AtomicBool>,
    patches: Arc<AtomicUsize>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(tree: Value) -> Self {
        Self {
            tree: Arc::new(RwLock::new(tree)),
            ..Self::default()
        }
    }

    /// A copy of the current tree.
    pub async fn tree(&self) -> Value {
        self.tree.read().await.clone()
    }

    pub async fn set_tree(&self, tree: Value) {
        *self.tree.write().await = tree;
    }

    /// While set, every call fails as if the remote were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of patches applied so far.
    pub fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), SyncError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::Remote("remote unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn read_snapshot(&self) -> Result<Value, SyncError> {
        self.check_reachable()?;
        Ok(self.tree.read().await.clone())
    }

    async fn patch(&self, patch: RemotePatch) -> Result<(), SyncError> {
        self.check_reachable()?;
        let mut tree = self.tree.write().await;
        if !tree.is_object() {
            *tree = Value::Object(Map::new());
        }
        if let Value::Object(root) = &mut *tree {
            for (key, value) in patch.subtrees() {
                if value.is_null() {
                    root.remove(key);
                } else {
                    root.insert(key.clone(), value.clone());
                }
            }
        }
        self.patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
