//! File-level embedding index.
//!
//! The index remembers which fingerprint each file was last embedded under.
//! Feeding it new content for a path is how callers signal a change: the
//! stale cache entry is invalidated and the new content is embedded (or
//! served from cache if identical content was seen before).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::Embedding;
use crate::cache::CachedEmbedder;
use crate::error::Result;
use crate::fingerprint::{fingerprint, fingerprint_set};
use crate::similarity::{SimilarityResult, find_top_k};

/// An entry in the embedding index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path of the embedded file.
    pub path: String,

    /// Fingerprint of the content that was embedded.
    pub fingerprint: String,

    /// The embedding vector.
    pub embedding: Embedding,
}

/// Embeddings of the current content of every known file.
pub struct EmbeddingIndex {
    embedder: CachedEmbedder,
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl EmbeddingIndex {
    /// Create an empty index backed by the given embedder.
    pub fn new(embedder: CachedEmbedder) -> Self {
        Self {
            embedder,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The embedder used to compute missing embeddings.
    pub fn embedder(&self) -> &CachedEmbedder {
        &self.embedder
    }

    /// Record the current content of `path` and return its embedding.
    ///
    /// If the content fingerprint differs from the one previously indexed for
    /// this path, the old cache entry is invalidated unless another indexed
    /// file still has that content.
    pub async fn update(&self, path: &str, text: &str) -> Result<Embedding> {
        let fp = fingerprint(text);

        let previous = {
            let entries = self.entries.read().await;
            match entries.get(path) {
                Some(entry) if entry.fingerprint == fp => return Ok(entry.embedding.clone()),
                Some(entry) => Some(entry.fingerprint.clone()),
                None => None,
            }
        };

        if let Some(old) = previous {
            debug!("Content of {path} changed, releasing {old}");
            self.release(path, &old).await?;
        }

        let embedding = self.embedder.get_or_compute(&fp, text).await?;
        self.entries.write().await.insert(
            path.to_string(),
            IndexEntry {
                path: path.to_string(),
                fingerprint: fp,
                embedding: embedding.clone(),
            },
        );

        Ok(embedding)
    }

    async fn release(&self, path: &str, old: &str) -> Result<()> {
        let shared = self
            .entries
            .read()
            .await
            .values()
            .any(|e| e.path != path && e.fingerprint == old);
        if !shared {
            self.embedder.cache().invalidate(old).await?;
        }
        Ok(())
    }

    /// Drop cache entries that no indexed file uses under the current model,
    /// including cached query embeddings.
    ///
    /// Call after a full pass over the project so that content embedded by
    /// earlier runs, and never seen by this index, is released.
    pub async fn prune_cache(&self) -> Result<usize> {
        let live: HashSet<String> = self
            .entries
            .read()
            .await
            .values()
            .map(|e| e.fingerprint.clone())
            .collect();
        let model = self.embedder.model();
        self.embedder
            .cache()
            .retain(|key| key.model == model && live.contains(&key.fingerprint))
            .await
    }

    /// Get the entry for a path.
    pub async fn get(&self, path: &str) -> Option<IndexEntry> {
        self.entries.read().await.get(path).cloned()
    }

    /// Remove a path from the index. Its cache entry is kept.
    pub async fn remove(&self, path: &str) -> Option<IndexEntry> {
        self.entries.write().await.remove(path)
    }

    /// Get the number of indexed files.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the index is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Fingerprint of the whole indexed file set.
    pub async fn set_fingerprint(&self) -> String {
        let entries = self.entries.read().await;
        fingerprint_set(
            entries
                .values()
                .map(|e| (e.path.as_str(), e.fingerprint.as_str())),
        )
    }

    /// Search indexed files by similarity to a query embedding.
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        min_score: f32,
    ) -> Result<Vec<SimilarityResult>> {
        let entries = self.entries.read().await;
        find_top_k(
            query,
            entries.values().map(|e| (e.path.as_str(), &e.embedding)),
            k,
            min_score,
        )
    }
}
