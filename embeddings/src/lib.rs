//! # Embeddings
//!
//! Semantic embedding generation, caching and lookup for context-set search.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through an
//!   [`EmbeddingProvider`]
//! - **Content-Addressed Caching**: Embeddings are keyed by a fingerprint of
//!   the embedded content and published only once fully written
//! - **File Index**: Tracks the current fingerprint of every file so stale
//!   entries are invalidated when content changes
//! - **Batch Embedding**: Bounded-concurrency embedding of many files with
//!   progress reporting and cancellation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► CachedEmbedder ──► EmbeddingIndex        │
//! │       │                    │                   │                │
//! │       ▼                    ▼                   ▼                │
//! │  OpenAI/Hashing      EmbeddingCache       embed_batch           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod batch;
pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod provider;
pub mod similarity;

pub use batch::{BatchConfig, BatchItem, BatchProgress, BatchReport, ProgressReporter, embed_batch};
pub use cache::{CachedEmbedder, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use fingerprint::{fingerprint, fingerprint_set};
pub use index::EmbeddingIndex;
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider, OpenAIProvider,
};
pub use similarity::{SimilarityResult, cosine_similarity, unit_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
