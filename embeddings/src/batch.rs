//! Batch embedding of many files.
//!
//! Files are embedded through an [`EmbeddingIndex`] with a small, fixed
//! number of files in flight. Progress is reported after every file.
//! Cancellation is checked before each file starts; files already in flight
//! finish and their cache entries persist, but a cancelled batch returns
//! [`EmbeddingError::Cancelled`] instead of a report.

use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EmbeddingError, Result};
use crate::index::EmbeddingIndex;

/// Configuration for batch embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of files embedded concurrently.
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl BatchConfig {
    /// Set the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// A file to embed.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Path of the file.
    pub path: String,

    /// Current content of the file.
    pub text: String,
}

impl BatchItem {
    /// Create a new batch item.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Progress of a running batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Files finished so far (embedded or failed).
    pub completed: usize,

    /// Total files in the batch.
    pub total: usize,
}

impl BatchProgress {
    /// Completion as a percentage in `0..=100`.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed.min(self.total) * 100) / self.total) as u8
    }
}

/// Receives batch progress updates.
pub trait ProgressReporter: Send + Sync {
    /// Called once with zero progress and then after every finished file.
    fn report(&self, progress: BatchProgress);
}

impl<F> ProgressReporter for F
where
    F: Fn(BatchProgress) + Send + Sync,
{
    fn report(&self, progress: BatchProgress) {
        self(progress);
    }
}

/// A file that could not be embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Path of the file.
    pub path: String,

    /// Why embedding failed.
    pub error: String,
}

/// Outcome of a completed batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Paths embedded successfully, sorted.
    pub embedded: Vec<String>,

    /// Files that failed, sorted by path.
    pub failed: Vec<BatchFailure>,
}

enum ItemOutcome {
    Embedded(String),
    Failed(BatchFailure),
    Skipped,
}

/// Embed every item through the index.
///
/// A failure on one file is recorded in the report and does not stop the
/// batch.
pub async fn embed_batch(
    index: &EmbeddingIndex,
    items: Vec<BatchItem>,
    config: &BatchConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<BatchReport> {
    let total = items.len();
    let concurrency = config.concurrency.max(1);
    info!("Embedding {total} files with concurrency {concurrency}");

    progress.report(BatchProgress {
        completed: 0,
        total,
    });

    let mut outcomes = stream::iter(items)
        .map(|item| async move {
            if cancel.is_cancelled() {
                return ItemOutcome::Skipped;
            }
            match index.update(&item.path, &item.text).await {
                Ok(_) => ItemOutcome::Embedded(item.path),
                Err(e) => {
                    warn!("Failed to embed {}: {e}", item.path);
                    ItemOutcome::Failed(BatchFailure {
                        path: item.path,
                        error: e.to_string(),
                    })
                }
            }
        })
        .buffer_unordered(concurrency);

    let mut report = BatchReport::default();
    let mut completed = 0;
    while let Some(outcome) = outcomes.next().await {
        match outcome {
            ItemOutcome::Embedded(path) => report.embedded.push(path),
            ItemOutcome::Failed(failure) => report.failed.push(failure),
            ItemOutcome::Skipped => continue,
        }
        completed += 1;
        progress.report(BatchProgress { completed, total });
    }

    if cancel.is_cancelled() {
        debug!("Batch cancelled after {completed} of {total} files");
        return Err(EmbeddingError::Cancelled);
    }

    report.embedded.sort();
    report.failed.sort_by(|a, b| a.path.cmp(&b.path));
    info!(
        "Embedded {} files, {} failed",
        report.embedded.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::cache::{CachedEmbedder, EmbeddingCache};
    use crate::fingerprint::fingerprint;
    use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider};

    fn hashing_index() -> EmbeddingIndex {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(16));
        EmbeddingIndex::new(CachedEmbedder::new(provider, Arc::new(EmbeddingCache::new())))
    }

    struct FailingOn(&'static str);

    #[async_trait]
    impl EmbeddingProvider for FailingOn {
        fn name(&self) -> &str {
            "failing"
        }

        fn default_model(&self) -> &str {
            "failing-v1"
        }

        fn default_dimension(&self) -> usize {
            1
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            if request.text.contains(self.0) {
                return Err(EmbeddingError::ApiRequest("refused".to_string()));
            }
            Ok(EmbeddingResponse {
                embedding: vec![1.0],
                model: "failing-v1".to_string(),
                dimension: 1,
                tokens_used: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(BatchProgress { completed: 0, total: 4 }.percent(), 0);
        assert_eq!(BatchProgress { completed: 1, total: 3 }.percent(), 33);
        assert_eq!(BatchProgress { completed: 4, total: 4 }.percent(), 100);
        assert_eq!(BatchProgress { completed: 0, total: 0 }.percent(), 100);
    }

    #[tokio::test]
    async fn test_batch_reports_progress_to_completion() {
        let index = hashing_index();
        let items: Vec<BatchItem> = (0..10)
            .map(|i| BatchItem::new(format!("src/f{i}.rs"), format!("fn f{i}() {{}}")))
            .collect();
        let seen = Mutex::new(Vec::new());
        let reporter = |p: BatchProgress| seen.lock().unwrap().push(p.percent());

        let report = embed_batch(
            &index,
            items,
            &BatchConfig::default().with_concurrency(3),
            &CancellationToken::new(),
            &reporter,
        )
        .await
        .unwrap();

        assert_eq!(report.embedded.len(), 10);
        assert_eq!(index.len().await, 10);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FailingOn("poison"));
        let index =
            EmbeddingIndex::new(CachedEmbedder::new(provider, Arc::new(EmbeddingCache::new())));
        let items = vec![
            BatchItem::new("a.rs", "fine"),
            BatchItem::new("b.rs", "poison"),
            BatchItem::new("c.rs", "also fine"),
        ];

        let report = embed_batch(
            &index,
            items,
            &BatchConfig::default(),
            &CancellationToken::new(),
            &|_: BatchProgress| {},
        )
        .await
        .unwrap();

        assert_eq!(report.embedded, vec!["a.rs".to_string(), "c.rs".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "b.rs");
    }

    #[tokio::test]
    async fn test_cancelled_batch_keeps_finished_cache_entries() {
        let index = hashing_index();
        let cancel = CancellationToken::new();
        let items: Vec<BatchItem> = (0..6)
            .map(|i| BatchItem::new(format!("f{i}.rs"), format!("body {i}")))
            .collect();

        let trigger = cancel.clone();
        let reporter = move |p: BatchProgress| {
            if p.completed == 2 {
                trigger.cancel();
            }
        };

        let result = embed_batch(
            &index,
            items,
            &BatchConfig::default().with_concurrency(1),
            &cancel,
            &reporter,
        )
        .await;

        assert!(matches!(result, Err(EmbeddingError::Cancelled)));
        let model = index.embedder().model().to_string();
        let cache = index.embedder().cache();
        assert!(cache.contains(&fingerprint("body 0"), &model).await);
        assert!(cache.contains(&fingerprint("body 1"), &model).await);
        assert!(!cache.contains(&fingerprint("body 5"), &model).await);
    }
}
