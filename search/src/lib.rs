//! # Search
//!
//! Hybrid search over source files for populating context sets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Hybrid Search                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   query ──► Analyzer (declarations)  ──► ast_score ─┐           │
//! │        └──► EmbeddingIndex (cosine)  ──► llm_score ─┼─► Ranker  │
//! │                                                     │     │     │
//! │                                     classify ◄──────┘     ▼     │
//! │                                                   SearchSession │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Structural analysis is pattern-based and classification is a
//! documented heuristic; see [`analyzer`] and [`classify`].

pub mod analyzer;
pub mod classify;
pub mod config;
pub mod error;
pub mod ranker;
pub mod session;

pub use analyzer::{Analysis, Analyzer, Declaration, Language, analyze};
pub use classify::{Classification, classify};
pub use config::{AnalyzerConfig, RankerConfig};
pub use error::{Result, SearchError};
pub use ranker::{HybridRanker, RankedResult, SourceFile, query_terms, structural_score};
pub use session::{SearchResults, SearchSession};
