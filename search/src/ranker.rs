//! Hybrid ranking of source files against a query.
//!
//! Each file gets two independent scores in `[0, 1]`:
//!
//! - `ast_score`: how well the query terms match the file's declarations,
//!   path and raw text
//! - `llm_score`: cosine similarity of the query and file embeddings,
//!   clamped to `[0, 1]`
//!
//! The final score is their weighted sum with the weights normalized to one.
//! A file has *synergy* when both scores exceed their thresholds.

use std::collections::HashSet;
use std::sync::Arc;

use contextual_embeddings::{Embedding, EmbeddingIndex, unit_similarity};
use futures::stream::{self, StreamExt};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analyzer::{Analysis, Analyzer, Declaration};
use crate::classify::{Classification, classify};
use crate::config::RankerConfig;
use crate::error::{Result, SearchError};

/// Weight of declaration and path matches within a term's structural score.
const STRUCTURE_WEIGHT: f32 = 0.7;

/// Weight of raw term frequency within a term's structural score.
const FREQUENCY_WEIGHT: f32 = 0.3;

/// Occurrence count at which the frequency signal saturates.
const FREQUENCY_SATURATION: f32 = 10.0;

const STOP_WORDS: &[&str] = &[
    "the", "an", "and", "or", "of", "to", "in", "on", "for", "is", "with", "how", "what", "where",
    "does", "do", "it", "by", "at", "be",
];

/// A file offered to the ranker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// One ranked file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub path: String,
    pub ast_score: f32,
    pub llm_score: f32,
    pub final_score: f32,
    pub classification: Classification,
    pub has_synergy: bool,
    /// Declarations that matched a query term.
    pub matches: Vec<Declaration>,
}

/// Split a query into lowercase search terms.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Structural score of a file for the given terms, with the declarations
/// that matched.
///
/// Per term: an exact declaration name scores 1.0, a declaration containing
/// the term (or contained in it) 0.6, and a path hit adds 0.3, capped at 1.
/// That is blended with a log-scaled occurrence count. The file score is the
/// mean over all terms.
pub fn structural_score(
    terms: &[String],
    path: &str,
    content: &str,
    analysis: &Analysis,
) -> (f32, Vec<Declaration>) {
    if terms.is_empty() {
        return (0.0, Vec::new());
    }

    let path = path.to_lowercase();
    let content = content.to_lowercase();
    let declarations: Vec<(String, &Declaration)> = analysis
        .declarations()
        .map(|d| (d.name.to_lowercase(), d))
        .collect();

    let mut matches: Vec<Declaration> = Vec::new();
    let mut total = 0.0;
    for term in terms {
        let mut declaration_score: f32 = 0.0;
        for (name, declaration) in &declarations {
            let score = if name == term {
                1.0
            } else if name.contains(term.as_str())
                || (name.len() >= 3 && term.contains(name.as_str()))
            {
                0.6
            } else {
                continue;
            };
            declaration_score = declaration_score.max(score);
            if !matches.contains(declaration) {
                matches.push((*declaration).clone());
            }
        }

        let path_score = if path.contains(term.as_str()) { 0.3 } else { 0.0 };
        let structure = (declaration_score + path_score).min(1.0);

        let count = content.matches(term.as_str()).count() as f32;
        let frequency = ((1.0 + count).ln() / (1.0 + FREQUENCY_SATURATION).ln()).min(1.0);

        total += STRUCTURE_WEIGHT * structure + FREQUENCY_WEIGHT * frequency;
    }

    matches.sort_by(|a, b| a.start_line.cmp(&b.start_line).then_with(|| a.name.cmp(&b.name)));
    (total / terms.len() as f32, matches)
}

struct Scored<'a> {
    file: &'a SourceFile,
    ast_score: f32,
    llm_score: f32,
    matches: Vec<Declaration>,
}

/// Ranks files by combining structural and embedding scores.
pub struct HybridRanker {
    index: Arc<EmbeddingIndex>,
    analyzer: Analyzer,
    config: RankerConfig,
}

impl HybridRanker {
    /// Create a ranker. Fails if the configuration is invalid.
    pub fn new(index: Arc<EmbeddingIndex>, config: RankerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index,
            analyzer: Analyzer::new(config.analyzer.clone()),
            config,
        })
    }

    /// The ranker configuration.
    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// The embedding index used for file embeddings.
    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    /// Rank `files` against `query`.
    ///
    /// Never fails: embedding problems only zero the affected `llm_score`.
    pub async fn rank(&self, query: &str, files: &[SourceFile]) -> Vec<RankedResult> {
        self.rank_cancellable(query, files, &CancellationToken::new())
            .await
            .unwrap_or_default()
    }

    /// Rank `files`, giving up with [`SearchError::Superseded`] as soon as
    /// `cancel` fires.
    pub async fn rank_cancellable(
        &self,
        query: &str,
        files: &[SourceFile],
        cancel: &CancellationToken,
    ) -> Result<Vec<RankedResult>> {
        let terms = query_terms(query);
        debug!("Ranking {} files for {query:?} (terms: {terms:?})", files.len());

        let query_embedding = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Superseded),
            embedding = self.index.embedder().embed_cached(query) => embedding,
        };
        let query_embedding = match query_embedding {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!("Query embedding failed, ranking structurally only: {e}");
                None
            }
        };

        let mut seen = HashSet::new();
        let unique: Vec<&SourceFile> = files
            .iter()
            .filter(|f| seen.insert(f.path.as_str()))
            .collect();

        // Built up front: a borrowing closure held by the stream is not
        // general enough for the search to be spawned.
        let query_embedding = query_embedding.as_ref();
        let pending: Vec<_> = unique
            .into_iter()
            .map(|file| self.score(file, &terms, query_embedding))
            .collect();
        let scoring = stream::iter(pending)
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<_>>();

        let scored = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Superseded),
            scored = scoring => scored,
        };

        let results = self.finish(scored);
        info!(
            "Ranked {} files for {query:?}, {} with synergy",
            results.len(),
            results.iter().filter(|r| r.has_synergy).count()
        );
        Ok(results)
    }

    async fn score<'a>(
        &self,
        file: &'a SourceFile,
        terms: &[String],
        query_embedding: Option<&Embedding>,
    ) -> Scored<'a> {
        let analysis = self.analyzer.analyze(&file.content, &file.path);
        let (ast_score, matches) = structural_score(terms, &file.path, &file.content, &analysis);
        let llm_score = match query_embedding {
            Some(query) => self.similarity(query, file).await,
            None => 0.0,
        };
        Scored {
            file,
            ast_score,
            llm_score,
            matches,
        }
    }

    async fn similarity(&self, query: &Embedding, file: &SourceFile) -> f32 {
        let embedding = match self.index.update(&file.path, &file.content).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Embedding {} failed: {e}", file.path);
                return 0.0;
            }
        };
        match unit_similarity(query, &embedding) {
            Ok(score) => score,
            Err(e) => {
                warn!("Comparing {} failed: {e}", file.path);
                0.0
            }
        }
    }

    fn finish(&self, scored: Vec<Scored<'_>>) -> Vec<RankedResult> {
        let (ast_weight, llm_weight) = self.config.normalized_weights();

        let mut ranked: Vec<(RankedResult, &SourceFile)> = scored
            .into_iter()
            .map(|s| {
                let final_score = ast_weight * s.ast_score + llm_weight * s.llm_score;
                let has_synergy = s.ast_score > self.config.ast_synergy_threshold
                    && s.llm_score > self.config.llm_synergy_threshold;
                (
                    RankedResult {
                        path: s.file.path.clone(),
                        ast_score: s.ast_score,
                        llm_score: s.llm_score,
                        final_score,
                        classification: Classification::Unrelated,
                        has_synergy,
                        matches: s.matches,
                    },
                    s.file,
                )
            })
            .collect();

        ranked.sort_by(|(a, _), (b, _)| {
            OrderedFloat(b.final_score)
                .cmp(&OrderedFloat(a.final_score))
                .then_with(|| a.path.cmp(&b.path))
        });

        let limit = match self.config.max_results {
            0 => ranked.len(),
            n => n,
        };
        ranked
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(rank, (mut result, file))| {
                result.classification =
                    classify(&file.path, &file.content, result.final_score, rank, &self.config);
                result
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_query_terms() {
        assert_eq!(
            query_terms("How does the Login flow work? login"),
            vec!["login", "flow", "work"]
        );
        assert!(query_terms("a ? !").is_empty());
    }

    #[test]
    fn test_structural_score_exact_declaration() {
        let terms = query_terms("login");
        let analysis = Analysis {
            functions: vec![Declaration::new("login", 3), Declaration::new("loginWithToken", 9)],
            classes: Vec::new(),
        };
        let (score, matches) = structural_score(
            &terms,
            "src/auth/login.ts",
            "function login() {}\nfunction loginWithToken() {}",
            &analysis,
        );

        // Structure saturates at 1; two occurrences give ln(3)/ln(11).
        let expected = 0.7 + 0.3 * (3.0f32.ln() / 11.0f32.ln());
        assert!((score - expected).abs() < 1e-6, "score {score}");
        assert_eq!(matches, analysis.functions);
    }

    #[test]
    fn test_structural_score_without_match() {
        let terms = query_terms("login");
        let (score, matches) =
            structural_score(&terms, "src/math.rs", "fn add() {}", &Analysis::default());
        assert_eq!(score, 0.0);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_structural_score_is_bounded() {
        let terms = query_terms("parse parser");
        let content = "parse parser ".repeat(100);
        let analysis = Analysis {
            functions: vec![Declaration::new("parse", 1), Declaration::new("parser", 2)],
            classes: Vec::new(),
        };
        let (score, _) = structural_score(&terms, "src/parse/parser.rs", &content, &analysis);
        assert!((score - 1.0).abs() < 1e-6, "score {score}");
    }
}
