//! Temporary working trees and per-worker locking

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;

/// Root for per-worker working trees.
///
/// Each worker name maps to exactly one tree path, so two runs for the same
/// name would race on it; [`Workspace::lock`] serializes them.
pub struct Workspace {
    root: Dir,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Workspace {
    pub fn new(root: Dir) -> Self {
        Self {
            root,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Dir {
        &self.root
    }

    /// Directory used for the given worker's tree
    pub fn tree_dir(&self, worker_name: &str) -> Dir {
        self.root.subdir(worker_name)
    }

    /// Acquire the exclusive lock for a worker name
    pub async fn lock(&self, worker_name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody is holding or waiting on.
            locks.retain(|name, lock| name == worker_name || Arc::strong_count(lock) > 1);
            locks
                .entry(worker_name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Create a fresh, empty tree for the worker, removing any stale one
    pub async fn prepare(&self, worker_name: &str) -> Result<WorkingTree, DeployError> {
        let dir = self.tree_dir(worker_name);
        if dir.exists().await {
            debug!("Removing stale working tree {}", dir.path().display());
            dir.delete().await?;
        }
        dir.create().await?;
        Ok(WorkingTree::new(dir, worker_name))
    }

    /// Remove whatever is left at the worker's tree path
    pub async fn sweep(&self, worker_name: &str) {
        let dir = self.tree_dir(worker_name);
        if let Err(e) = dir.delete().await {
            warn!("Failed to remove {}: {}", dir.path().display(), e);
        }
    }
}

/// A cloned repository on disk.
///
/// The directory is removed by [`WorkingTree::destroy`], or synchronously on
/// drop if that never happened, so every exit path leaves no tree behind.
#[derive(Debug)]
pub struct WorkingTree {
    dir: Dir,
    worker_name: String,
    removed: bool,
}

impl WorkingTree {
    fn new(dir: Dir, worker_name: &str) -> Self {
        Self {
            dir,
            worker_name: worker_name.to_string(),
            removed: false,
        }
    }

    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// Remove the tree from disk
    pub async fn destroy(mut self) -> Result<(), DeployError> {
        self.dir.delete().await?;
        self.removed = true;
        debug!("Removed working tree {}", self.dir.path().display());
        Ok(())
    }
}

impl Drop for WorkingTree {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = self.dir.delete_blocking() {
            warn!("Failed to remove working tree {}: {}", self.dir.path().display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_prepare_replaces_stale_tree() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(Dir::new(root.path()));

        let stale = workspace.tree_dir("demo");
        stale.file("leftover.txt").write_string("old").await.unwrap();

        let tree = workspace.prepare("demo").await.unwrap();
        assert!(tree.dir().exists().await);
        assert!(tree.dir().is_empty().await.unwrap());
        assert_eq!(tree.worker_name(), "demo");

        tree.destroy().await.unwrap();
        assert!(!stale.exists().await);
    }

    #[tokio::test]
    async fn test_drop_removes_tree() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(Dir::new(root.path()));

        let tree = workspace.prepare("demo").await.unwrap();
        tree.dir().file("index.js").write_string("x").await.unwrap();
        let path = tree.path().to_path_buf();
        drop(tree);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_lock_serializes_same_name() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::new(Dir::new(root.path())));

        let guard = workspace.lock("demo").await;

        let other = workspace.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock("demo").await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        // A different name is not blocked.
        let _unrelated = tokio::time::timeout(Duration::from_secs(1), workspace.lock("other"))
            .await
            .unwrap();

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
