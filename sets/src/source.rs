//! Access to source file contents.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, SetError};

/// Supplies the text of project files by manifest path.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Read a file as UTF-8 text.
    ///
    /// Fails with [`SetError::SourceNotFound`] or
    /// [`SetError::PermissionDenied`] when the file cannot be read.
    async fn read_file(&self, path: &str) -> Result<String>;
}

/// Reads files relative to a project root on disk.
#[derive(Debug, Clone)]
pub struct FsFileSource {
    root: PathBuf,
}

impl FsFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileSource for FsFileSource {
    async fn read_file(&self, path: &str) -> Result<String> {
        let full = self.root.join(path);
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SetError::SourceNotFound(full.clone()),
                ErrorKind::PermissionDenied => SetError::PermissionDenied(full.clone()),
                _ => SetError::Io(e),
            })
    }
}

/// In-memory file contents, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSource {
    files: HashMap<String, String>,
}

impl MemoryFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Builder form of [`MemoryFileSource::insert`].
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }
}

#[async_trait]
impl FileSource for MemoryFileSource {
    async fn read_file(&self, path: &str) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| SetError::SourceNotFound(PathBuf::from(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_source_reads_relative_paths() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("src")).await.unwrap();
        tokio::fs::write(dir.path().join("src/login.ts"), "export function login() {}")
            .await
            .unwrap();

        let source = FsFileSource::new(dir.path());
        assert_eq!(
            source.read_file("src/login.ts").await.unwrap(),
            "export function login() {}"
        );
    }

    #[tokio::test]
    async fn test_fs_source_missing_file() {
        let dir = TempDir::new().unwrap();
        let source = FsFileSource::new(dir.path());
        let err = source.read_file("nope.rs").await.unwrap_err();
        assert!(matches!(err, SetError::SourceNotFound(path) if path.ends_with("nope.rs")));
    }

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemoryFileSource::new().with_file("a.rs", "fn a() {}");
        assert_eq!(source.read_file("a.rs").await.unwrap(), "fn a() {}");
        assert!(source.read_file("b.rs").await.is_err());
    }
}
