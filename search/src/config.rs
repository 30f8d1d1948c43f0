//! Configuration for structural analysis and hybrid ranking.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Configuration for the hybrid ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Weight of the structural score.
    pub ast_weight: f32,

    /// Weight of the embedding similarity score.
    pub llm_weight: f32,

    /// Structural score a file must exceed to count towards synergy.
    pub ast_synergy_threshold: f32,

    /// Similarity score a file must exceed to count towards synergy.
    pub llm_synergy_threshold: f32,

    /// Final score below which a file is unrelated.
    pub unrelated_threshold: f32,

    /// Final score from which a top-ranked file is core logic.
    pub core_logic_threshold: f32,

    /// How many of the top results may be classified as core logic by rank.
    pub core_logic_top_n: usize,

    /// Maximum number of results to return (0 = no limit).
    pub max_results: usize,

    /// Number of files embedded concurrently.
    pub concurrency: usize,

    /// Structural analyzer settings.
    pub analyzer: AnalyzerConfig,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            ast_weight: 0.4,
            llm_weight: 0.6,
            ast_synergy_threshold: 0.1,
            llm_synergy_threshold: 0.3,
            unrelated_threshold: 0.05,
            core_logic_threshold: 0.4,
            core_logic_top_n: 3,
            max_results: 50,
            concurrency: 4,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl RankerConfig {
    /// Set the score weights. They are normalized when scores are combined.
    pub fn with_weights(mut self, ast_weight: f32, llm_weight: f32) -> Self {
        self.ast_weight = ast_weight;
        self.llm_weight = llm_weight;
        self
    }

    /// Set the synergy thresholds.
    pub fn with_synergy_thresholds(mut self, ast: f32, llm: f32) -> Self {
        self.ast_synergy_threshold = ast;
        self.llm_synergy_threshold = llm;
        self
    }

    /// Set the result limit.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Set the embedding concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Check that the weights can be normalized and thresholds are scores.
    pub fn validate(&self) -> Result<()> {
        let weights = [self.ast_weight, self.llm_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SearchError::Config(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        if self.ast_weight + self.llm_weight <= 0.0 {
            return Err(SearchError::Config(
                "at least one weight must be positive".to_string(),
            ));
        }

        let thresholds = [
            ("ast_synergy_threshold", self.ast_synergy_threshold),
            ("llm_synergy_threshold", self.llm_synergy_threshold),
            ("unrelated_threshold", self.unrelated_threshold),
            ("core_logic_threshold", self.core_logic_threshold),
        ];
        if let Some((name, value)) = thresholds
            .iter()
            .find(|(_, value)| !(0.0..=1.0).contains(value))
        {
            return Err(SearchError::Config(format!(
                "{name} must be within 0..=1, got {value}"
            )));
        }
        Ok(())
    }

    /// Weights scaled to sum to one.
    pub fn normalized_weights(&self) -> (f32, f32) {
        let total = self.ast_weight + self.llm_weight;
        if total <= 0.0 {
            return (0.5, 0.5);
        }
        (self.ast_weight / total, self.llm_weight / total)
    }
}

/// Configuration for the structural analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Only this many leading bytes of a file are analyzed.
    pub max_bytes: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024,
        }
    }
}
