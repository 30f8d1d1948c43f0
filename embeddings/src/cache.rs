//! Content-addressed embedding cache.
//!
//! Entries are keyed by `(fingerprint, model)`. Each key owns a write-once
//! slot: the first caller computes the embedding, writes it to disk (temp
//! file + rename) and only then publishes it in memory. Concurrent callers for
//! the same key await that single computation, and readers never observe a
//! half-written entry.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::fingerprint::fingerprint;
use crate::provider::{EmbeddingProvider, EmbeddingRequest};

/// Key of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Content fingerprint of the embedded text.
    pub fingerprint: String,

    /// Model that produced the embedding.
    pub model: String,
}

impl CacheKey {
    /// Create a new cache key.
    pub fn new(fingerprint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            model: model.into(),
        }
    }

    fn file_name(&self) -> String {
        let model: String = self
            .model
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}-{model}.json", self.fingerprint)
    }
}

/// Cache entry for an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of the embedded content.
    pub fingerprint: String,

    /// Model used to generate the embedding.
    pub model: String,

    /// The embedding vector.
    pub embedding: Embedding,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    fn key(&self) -> CacheKey {
        CacheKey::new(&self.fingerprint, &self.model)
    }
}

type Slot = Arc<OnceCell<Arc<CacheEntry>>>;

/// Cache for embeddings to avoid redundant model calls.
pub struct EmbeddingCache {
    /// Write-once slots by key.
    slots: RwLock<HashMap<CacheKey, Slot>>,

    /// Directory for persistent entries, one file per entry.
    cache_dir: Option<PathBuf>,
}

impl EmbeddingCache {
    /// Create a new in-memory cache.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            cache_dir: None,
        }
    }

    /// Create a cache persisted under `dir`, loading any existing entries.
    pub async fn with_persistence(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            EmbeddingError::Cache(format!("cannot create cache dir {}: {e}", dir.display()))
        })?;

        let cache = Self {
            slots: RwLock::new(HashMap::new()),
            cache_dir: Some(dir),
        };
        cache.load().await?;

        Ok(cache)
    }

    /// Get an embedding from the cache, if it has been published.
    pub async fn get(&self, fingerprint: &str, model: &str) -> Option<Embedding> {
        let key = CacheKey::new(fingerprint, model);
        let slots = self.slots.read().await;
        slots
            .get(&key)
            .and_then(|slot| slot.get())
            .map(|entry| entry.embedding.clone())
    }

    /// Check if an embedding is cached.
    pub async fn contains(&self, fingerprint: &str, model: &str) -> bool {
        self.get(fingerprint, model).await.is_some()
    }

    /// Return the cached embedding for the key or compute, persist and
    /// publish it.
    ///
    /// `compute` runs at most once per key among concurrent callers. If it
    /// fails nothing is published and a later call retries.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &str,
        model: &str,
        compute: F,
    ) -> Result<Embedding>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Embedding>>,
    {
        let key = CacheKey::new(fingerprint, model);
        let slot = self.slot(&key).await;

        if let Some(entry) = slot.get() {
            debug!("Cache hit for {}", key.fingerprint);
            return Ok(entry.embedding.clone());
        }

        let initialized = slot
            .get_or_try_init(|| async {
                debug!("Cache miss for {}, computing", key.fingerprint);
                let embedding = compute().await?;
                let entry = CacheEntry {
                    fingerprint: key.fingerprint.clone(),
                    model: key.model.clone(),
                    embedding,
                    created_at: Utc::now(),
                };
                // The read guard keeps `invalidate` from running between the
                // check and the write.
                let slots = self.slots.read().await;
                if slots.get(&key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                    self.persist(&key, &entry).await?;
                } else {
                    debug!("{} was invalidated while computing", key.fingerprint);
                }
                Ok::<_, EmbeddingError>(Arc::new(entry))
            })
            .await;

        match initialized {
            Ok(entry) => Ok(entry.embedding.clone()),
            Err(e) => {
                self.discard_empty(&key, &slot).await;
                Err(e)
            }
        }
    }

    /// Remove `slot` if it is still the current, unpublished slot for `key`.
    async fn discard_empty(&self, key: &CacheKey, slot: &Slot) {
        let mut slots = self.slots.write().await;
        if slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized())
        {
            slots.remove(key);
        }
    }

    /// Drop every entry computed from `fingerprint`, in memory and on disk.
    ///
    /// Returns the number of entries removed.
    pub async fn invalidate(&self, fingerprint: &str) -> Result<usize> {
        let removed = self
            .remove_where(|key| key.fingerprint == fingerprint, true)
            .await?;
        if removed > 0 {
            debug!("Invalidated {removed} cache entries for {fingerprint}");
        }
        Ok(removed)
    }

    /// Drop every published entry for which `keep` is false, in memory and
    /// on disk. Entries still being computed are left alone.
    ///
    /// Returns the number of entries removed.
    pub async fn retain(&self, keep: impl Fn(&CacheKey) -> bool) -> Result<usize> {
        let removed = self.remove_where(|key| !keep(key), false).await?;
        if removed > 0 {
            info!("Pruned {removed} cache entries");
        }
        Ok(removed)
    }

    /// Remove matching slots. Unpublished slots are removed only with
    /// `pending`; a computation whose slot was removed is not persisted.
    async fn remove_where(
        &self,
        remove: impl Fn(&CacheKey) -> bool,
        pending: bool,
    ) -> Result<usize> {
        // Held across the file removals so a concurrent computation cannot
        // persist an entry for a key that is being dropped.
        let mut slots = self.slots.write().await;
        let keys: Vec<CacheKey> = slots
            .iter()
            .filter(|(key, slot)| remove(key) && (pending || slot.initialized()))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            slots.remove(key);
        }

        if let Some(dir) = &self.cache_dir {
            for key in &keys {
                match fs::remove_file(dir.join(key.file_name())).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(keys.len())
    }

    /// Clear the in-memory cache. Persisted entries are left on disk.
    pub async fn clear(&self) {
        self.slots.write().await.clear();
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let slots = self.slots.read().await;
        let published: Vec<&Arc<CacheEntry>> = slots.values().filter_map(|s| s.get()).collect();
        let mut models: Vec<String> = published
            .iter()
            .map(|e| e.model.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        models.sort();

        CacheStats {
            entries: published.len(),
            models,
        }
    }

    async fn slot(&self, key: &CacheKey) -> Slot {
        if let Some(slot) = self.slots.read().await.get(key) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().await.entry(key.clone()).or_default())
    }

    /// Write one entry to disk atomically.
    async fn persist(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let Some(dir) = &self.cache_dir else {
            return Ok(());
        };

        let path = dir.join(key.file_name());
        let temp_path = dir.join(format!("{}.tmp", key.file_name()));
        let content = serde_json::to_vec(entry)?;

        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    /// Load persisted entries from disk. Unreadable entries are skipped.
    async fn load(&self) -> Result<()> {
        let Some(dir) = &self.cache_dir else {
            return Ok(());
        };

        let mut loaded = HashMap::new();
        let mut dir_entries = fs::read_dir(dir).await?;
        while let Some(dir_entry) = dir_entries.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let parsed = fs::read(&path)
                .await
                .map_err(EmbeddingError::from)
                .and_then(|bytes| {
                    serde_json::from_slice::<CacheEntry>(&bytes).map_err(EmbeddingError::from)
                });
            match parsed {
                Ok(entry) => {
                    let key = entry.key();
                    loaded.insert(key, Arc::new(OnceCell::new_with(Some(Arc::new(entry)))));
                }
                Err(e) => warn!("Skipping cache entry {}: {e}", path.display()),
            }
        }

        info!("Loaded {} cache entries from disk", loaded.len());
        self.slots.write().await.extend(loaded);
        Ok(())
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of published entries.
    pub entries: usize,

    /// Models with cached embeddings.
    pub models: Vec<String>,
}

/// A provider paired with a cache.
///
/// Cloning is cheap; clones share both the provider and the cache.
#[derive(Clone)]
pub struct CachedEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
}

impl CachedEmbedder {
    /// Create a new cached embedder.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: Arc<EmbeddingCache>) -> Self {
        Self { provider, cache }
    }

    /// Model used for every embedding produced by this embedder.
    pub fn model(&self) -> &str {
        self.provider.default_model()
    }

    /// Embed text without touching the cache.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let response = self.provider.embed(EmbeddingRequest::new(text)).await?;
        Ok(response.embedding)
    }

    /// Embed text under an explicit fingerprint, using the cache.
    pub async fn get_or_compute(&self, fingerprint: &str, text: &str) -> Result<Embedding> {
        self.cache
            .get_or_compute(fingerprint, self.model(), || self.embed(text))
            .await
    }

    /// Embed text keyed by its own fingerprint.
    pub async fn embed_cached(&self, text: &str) -> Result<Embedding> {
        self.get_or_compute(&fingerprint(text), text).await
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}
