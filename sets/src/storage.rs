//! Working-copy persistence.
//!
//! A working copy is the export document of the whole repository, stored so
//! that an editing session can be resumed. Writes go to a temporary file
//! that is then renamed over the target, so a crash never leaves a
//! half-written document behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::Result;
use crate::export::{ExportDocument, export_all};
use crate::repository::Repository;

/// Name of the working copy inside a project root.
pub const DEFAULT_FILE_NAME: &str = "context-sets.json";

/// Loads and saves a repository.
#[async_trait]
pub trait WorkingCopyStore: Send + Sync {
    /// Load the stored repository, or `None` if nothing was saved yet.
    async fn load_working_copy(&self) -> Result<Option<Repository>>;

    /// Replace the stored repository.
    async fn save_working_copy(&self, repo: &Repository) -> Result<()>;
}

/// Working copy stored as a `context-sets.json` file.
#[derive(Debug, Clone)]
pub struct JsonWorkingCopy {
    path: PathBuf,
}

impl JsonWorkingCopy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Working copy at `<root>/context-sets.json`.
    pub fn in_project(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(DEFAULT_FILE_NAME))
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `content` atomically.
    pub async fn write_atomic(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkingCopyStore for JsonWorkingCopy {
    async fn load_working_copy(&self) -> Result<Option<Repository>> {
        if !fs::try_exists(&self.path).await? {
            debug!("No working copy at {}", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).await?;
        let repo = Repository::from_document(ExportDocument::from_json(&content)?)?;
        info!(
            "Loaded {} context sets from {}",
            repo.len(),
            self.path.display()
        );
        Ok(Some(repo))
    }

    async fn save_working_copy(&self, repo: &Repository) -> Result<()> {
        let content = export_all(repo).to_json()?;
        self.write_atomic(&content).await?;
        debug!("Saved working copy to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SetError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_working_copy() {
        let dir = TempDir::new().unwrap();
        let store = JsonWorkingCopy::in_project(dir.path());
        assert!(store.load_working_copy().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonWorkingCopy::new(dir.path().join("nested/context-sets.json"));

        let mut repo = Repository::new();
        repo.create("auth").unwrap();
        repo.add_path_to_set("auth", "src/login.ts").unwrap();
        store.save_working_copy(&repo).await.unwrap();

        assert!(!dir.path().join("nested/context-sets.json.tmp").exists());
        let loaded = store.load_working_copy().await.unwrap().unwrap();
        assert_eq!(loaded, repo);
    }

    #[tokio::test]
    async fn test_load_invalid_document() {
        let dir = TempDir::new().unwrap();
        let store = JsonWorkingCopy::in_project(dir.path());
        store.write_atomic("{not json").await.unwrap();

        let err = store.load_working_copy().await.unwrap_err();
        assert!(matches!(err, SetError::Serialization(_)));
    }
}
