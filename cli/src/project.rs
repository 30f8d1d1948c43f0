//! The project a `ctx` invocation works on: its root, working copy, source
//! files and embedding stack.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use contextual_embeddings::{
    CachedEmbedder, EmbeddingCache, EmbeddingIndex, EmbeddingProvider, HashingProvider,
    OpenAIProvider,
};
use contextual_search::SourceFile;
use contextual_sets::{FsFileSource, JsonWorkingCopy, Repository, WorkingCopyStore};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::{EmbeddingSettings, ProjectConfig, ProviderKind};

/// Directory for `ctx` state inside a project.
const STATE_DIR: &str = ".contextual";

pub struct Project {
    root: PathBuf,
    store: JsonWorkingCopy,
    config: ProjectConfig,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, config: ProjectConfig) -> Self {
        let root = root.into();
        let store = JsonWorkingCopy::new(root.join(&config.working_copy));
        Self {
            root,
            store,
            config,
        }
    }

    /// Project rooted at `--root`, the configured root or the current
    /// directory.
    pub fn locate(root: Option<PathBuf>, config: ProjectConfig) -> Result<Self> {
        let root = match root.or_else(|| config.root.clone()) {
            Some(root) => root,
            None => std::env::current_dir().context("failed to read the current directory")?,
        };
        Ok(Self::new(root, config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the working copy.
    pub fn working_copy(&self) -> &Path {
        self.store.path()
    }

    /// Create an empty working copy. Returns `false` if one already exists.
    pub async fn init(&self) -> Result<bool> {
        if self.store.load_working_copy().await?.is_some() {
            return Ok(false);
        }
        self.store.save_working_copy(&Repository::new()).await?;
        info!("Initialized {}", self.working_copy().display());
        Ok(true)
    }

    /// Load the working copy, failing if the project was never initialized.
    pub async fn load(&self) -> Result<Repository> {
        match self.store.load_working_copy().await? {
            Some(repo) => Ok(repo),
            None => bail!(
                "no {} in {}; run `ctx init` first",
                self.config.working_copy,
                self.root.display()
            ),
        }
    }

    pub async fn save(&self, repo: &Repository) -> Result<()> {
        self.store.save_working_copy(repo).await?;
        Ok(())
    }

    /// File contents relative to the project root.
    pub fn file_source(&self) -> FsFileSource {
        FsFileSource::new(&self.root)
    }

    /// Turn a user-supplied path into a `/`-separated path relative to the
    /// root. The file must exist inside the project.
    pub fn relative_path(&self, path: &str) -> Result<String> {
        let candidate = Path::new(path);
        let full = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        if !full.is_file() {
            bail!("not a file: {}", full.display());
        }

        let relative = full
            .strip_prefix(&self.root)
            .with_context(|| format!("{} is outside {}", full.display(), self.root.display()))?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => bail!("{path} is outside {}", self.root.display()),
            }
        }
        Ok(parts.join("/"))
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.config.exclude_dirs.iter().any(|d| d == name))
    }

    /// Every project file eligible for search, as sorted relative paths.
    pub fn scan(&self) -> Vec<String> {
        let working_copy = self.config.working_copy.as_str();
        let mut paths: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .metadata()
                    .is_ok_and(|m| m.len() <= self.config.max_file_bytes)
            })
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?;
                let parts: Option<Vec<&str>> =
                    relative.components().map(|c| c.as_os_str().to_str()).collect();
                Some(parts?.join("/"))
            })
            .filter(|path| path != working_copy)
            .collect();
        paths.sort();
        debug!("Scanned {} files under {}", paths.len(), self.root.display());
        paths
    }

    /// Read the given files as text, skipping anything unreadable or
    /// binary.
    pub async fn read_sources(&self, paths: &[String]) -> Vec<SourceFile> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            match tokio::fs::read_to_string(self.root.join(path)).await {
                Ok(content) => files.push(SourceFile::new(path.as_str(), content)),
                Err(e) => debug!("Skipping {path}: {e}"),
            }
        }
        files
    }

    /// Directory of the persistent embedding cache.
    pub fn cache_dir(&self, settings: &EmbeddingSettings) -> PathBuf {
        settings
            .cache_dir
            .clone()
            .unwrap_or_else(|| self.root.join(STATE_DIR).join("embeddings"))
    }

    /// Files to search or embed: the scan minus the embedding cache, which
    /// may live inside the project.
    pub async fn sources(&self, settings: &EmbeddingSettings) -> Vec<SourceFile> {
        let cache_dir = self.cache_dir(settings);
        let paths: Vec<String> = self
            .scan()
            .into_iter()
            .filter(|path| !self.root.join(path).starts_with(&cache_dir))
            .collect();
        self.read_sources(&paths).await
    }

    /// Embedding index backed by the configured provider and a persistent
    /// cache.
    pub async fn embedding_index(&self, settings: &EmbeddingSettings) -> Result<Arc<EmbeddingIndex>> {
        let provider = build_provider(settings)?;
        let cache_dir = self.cache_dir(settings);
        let cache = EmbeddingCache::with_persistence(&cache_dir)
            .await
            .with_context(|| format!("failed to open embedding cache {}", cache_dir.display()))?;
        Ok(Arc::new(EmbeddingIndex::new(CachedEmbedder::new(
            provider,
            Arc::new(cache),
        ))))
    }
}

/// Instantiate the configured embedding provider.
pub fn build_provider(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    match settings.provider {
        ProviderKind::Hashing => Ok(Arc::new(HashingProvider::new(settings.dimension))),
        ProviderKind::OpenAI => {
            let mut provider = OpenAIProvider::new();
            if let Some(model) = &settings.model {
                provider = provider.with_model(model);
            }
            if let Some(base_url) = &settings.base_url {
                provider = provider.with_base_url(base_url);
            }
            if !provider.is_available() {
                bail!("OPENAI_API_KEY is not set; set it or use provider = \"hashing\"");
            }
            Ok(Arc::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn project_with_files(files: &[(&str, &str)]) -> (TempDir, Project) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let project = Project::new(dir.path(), ProjectConfig::default());
        (dir, project)
    }

    #[test]
    fn test_scan_skips_excluded_dirs() {
        let (_dir, project) = project_with_files(&[
            ("src/login.ts", "export function login() {}"),
            ("src/util/strings.ts", "export const trim = (s) => s.trim();"),
            ("node_modules/dep/index.js", "module.exports = {};"),
            (".git/HEAD", "ref: refs/heads/main"),
            ("context-sets.json", "{}"),
        ]);

        assert_eq!(project.scan(), vec!["src/login.ts", "src/util/strings.ts"]);
    }

    #[test]
    fn test_relative_path() {
        let (dir, project) = project_with_files(&[("src/login.ts", "")]);

        assert_eq!(project.relative_path("src/login.ts").unwrap(), "src/login.ts");
        assert_eq!(project.relative_path("./src/login.ts").unwrap(), "src/login.ts");
        let absolute = dir.path().join("src/login.ts");
        assert_eq!(
            project.relative_path(absolute.to_str().unwrap()).unwrap(),
            "src/login.ts"
        );
        assert!(project.relative_path("src/missing.ts").is_err());
    }

    #[tokio::test]
    async fn test_init_and_load() {
        let (_dir, project) = project_with_files(&[]);
        assert!(project.load().await.is_err());

        assert!(project.init().await.unwrap());
        assert!(!project.init().await.unwrap());
        assert!(project.load().await.unwrap().is_empty());
    }

    #[test]
    fn test_default_provider_is_hashing() {
        let settings = EmbeddingSettings::default();
        assert_eq!(build_provider(&settings).unwrap().name(), "hashing");
    }
}
