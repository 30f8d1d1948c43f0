//! `ctx` configuration.
//!
//! Read from a TOML file; every section and key is optional. Without
//! `--config` the file is looked up at `<config dir>/contextual/config.toml`
//! and silently replaced by defaults when absent.
//!
//! ```toml
//! log_level = "info"
//!
//! [project]
//! working_copy = "context-sets.json"
//! exclude_dirs = ["node_modules", "target"]
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//!
//! [ranker]
//! ast_weight = 0.4
//! llm_weight = 0.6
//! max_results = 20
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use contextual_search::RankerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub project: ProjectConfig,
    pub embedding: EmbeddingSettings,
    pub ranker: RankerConfig,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            embedding: EmbeddingSettings::default(),
            ranker: RankerConfig::default(),
            log_level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project root; defaults to the current directory.
    pub root: Option<PathBuf>,

    /// Working copy file name inside the root.
    pub working_copy: String,

    /// Directory names skipped when scanning the project.
    pub exclude_dirs: Vec<String>,

    /// Files larger than this are not searched or embedded.
    pub max_file_bytes: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: None,
            working_copy: contextual_sets::storage::DEFAULT_FILE_NAME.to_string(),
            exclude_dirs: [
                ".git",
                ".hg",
                ".svn",
                ".contextual",
                "node_modules",
                "target",
                "vendor",
                ".venv",
                "venv",
                "build",
                "dist",
                "__pycache__",
                ".idea",
                ".vscode",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            max_file_bytes: 512 * 1024,
        }
    }
}

/// Which embedding provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible embeddings API, key from `OPENAI_API_KEY`.
    #[serde(rename = "openai")]
    OpenAI,
    /// Local feature-hashing embedder; works offline.
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: ProviderKind,

    /// Model override for the OpenAI provider.
    pub model: Option<String>,

    /// Base URL override for the OpenAI provider.
    pub base_url: Option<String>,

    /// Output dimension of the hashing provider.
    pub dimension: usize,

    /// Embedding cache directory; defaults to `<root>/.contextual/embeddings`.
    pub cache_dir: Option<PathBuf>,

    /// Files embedded concurrently by `ctx embed`.
    pub concurrency: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Hashing,
            model: None,
            base_url: None,
            dimension: 256,
            cache_dir: None,
            concurrency: 4,
        }
    }
}

/// `<config dir>/contextual/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("contextual").join("config.toml"))
}

impl CliConfig {
    /// Load the configuration.
    ///
    /// An explicitly given file must exist; the default location may be
    /// missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if required {
                bail!("config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file: {}", path.display()))
    }

    /// Parse TOML configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.ranker.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(CliConfig::parse("").unwrap(), CliConfig::default());
    }

    #[test]
    fn test_parse_sections() {
        let config = CliConfig::parse(
            r#"
log_level = "debug"

[project]
working_copy = "sets.json"

[embedding]
provider = "openai"
model = "text-embedding-3-large"

[ranker]
max_results = 5
"#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.project.working_copy, "sets.json");
        assert_eq!(config.project.exclude_dirs, ProjectConfig::default().exclude_dirs);
        assert_eq!(config.embedding.provider, ProviderKind::OpenAI);
        assert_eq!(config.embedding.model.as_deref(), Some("text-embedding-3-large"));
        assert_eq!(config.ranker.max_results, 5);
        assert_eq!(config.ranker.llm_weight, 0.6);
    }

    #[test]
    fn test_invalid_ranker_config() {
        assert!(CliConfig::parse("[ranker]\nast_weight = -1.0\n").is_err());
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[embedding]\nprovider = \"hashing\"\ndimension = 64\n").unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.embedding.dimension, 64);
    }
}
