//! Error types for search and ranking.

use thiserror::Error;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while ranking files.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] contextual_embeddings::EmbeddingError),

    /// A newer search replaced this one before it finished.
    #[error("search superseded by a newer query")]
    Superseded,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
