//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DeployError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DeployError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Blocking variant of [`Dir::delete`] for use from `Drop`
    pub fn delete_blocking(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// True when the directory is missing or has no entries
    pub async fn is_empty(&self) -> Result<bool, DeployError> {
        self.is_empty_ignoring(&[]).await
    }

    /// Like [`Dir::is_empty`], but entries named in `ignored` do not count
    pub async fn is_empty_ignoring(&self, ignored: &[&str]) -> Result<bool, DeployError> {
        if !self.exists().await {
            return Ok(true);
        }
        let mut entries = fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !ignored.iter().any(|name| entry.file_name() == **name) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Get a file within this directory; `name` may contain `/` separators
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dir_lifecycle() {
        let root = tempfile::tempdir().unwrap();
        let dir = Dir::new(root.path()).subdir("tree");

        assert!(!dir.exists().await);
        assert!(dir.is_empty().await.unwrap());

        dir.create().await.unwrap();
        dir.file("src/index.js").write_string("export default {}").await.unwrap();
        assert!(!dir.is_empty().await.unwrap());
        assert!(!dir.is_empty_ignoring(&[".git"]).await.unwrap());

        dir.delete().await.unwrap();
        assert!(!dir.exists().await);
        dir.delete_blocking().unwrap();
    }
}
