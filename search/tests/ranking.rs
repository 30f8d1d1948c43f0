//! Ranking and session behaviour with a deterministic embedding provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use contextual_embeddings::{
    CachedEmbedder, EmbeddingCache, EmbeddingError, EmbeddingIndex, EmbeddingProvider,
    EmbeddingRequest, EmbeddingResponse,
};
use contextual_search::{
    Classification, HybridRanker, RankerConfig, SearchError, SearchSession, SourceFile,
};
use pretty_assertions::assert_eq;
use tokio::sync::Notify;

/// Returns a fixed vector per exact text; unknown texts get the zero vector.
/// Texts listed in `failing` error, texts in `blocking` never complete.
#[derive(Default)]
struct StaticProvider {
    vectors: HashMap<String, Vec<f32>>,
    failing: Vec<String>,
    blocking: Vec<String>,
    blocked: Arc<Notify>,
}

impl StaticProvider {
    fn with(mut self, text: &str, vector: [f32; 3]) -> Self {
        self.vectors.insert(text.to_string(), vector.to_vec());
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn default_model(&self) -> &str {
        "static-3"
    }

    fn default_dimension(&self) -> usize {
        3
    }

    async fn embed(&self, request: EmbeddingRequest) -> contextual_embeddings::Result<EmbeddingResponse> {
        if self.failing.contains(&request.text) {
            return Err(EmbeddingError::ApiRequest("boom".to_string()));
        }
        if self.blocking.contains(&request.text) {
            self.blocked.notify_one();
            std::future::pending::<()>().await;
        }
        let embedding = self
            .vectors
            .get(&request.text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; 3]);
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: "static-3".to_string(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

const LOGIN_TS: &str = "export function login(user, password) {\n  return check(user, password);\n}\n";
const VERIFY_TS: &str = "export function verifyCredentials(user, secret) {\n  return compare(user, secret);\n}\n";
const BOTH_TS: &str = "export function login(token) {\n  return session(token);\n}\n";
const MATH_TS: &str = "export function add(a, b) {\n  return a + b;\n}\n";

fn provider() -> StaticProvider {
    StaticProvider::default()
        .with("login", [1.0, 0.0, 0.0])
        .with(LOGIN_TS, [0.0, 0.0, 1.0])
        .with(VERIFY_TS, [0.8, 0.6, 0.0])
        .with(BOTH_TS, [1.0, 0.0, 0.0])
        .with(MATH_TS, [0.0, 1.0, 0.0])
}

fn ranker(provider: StaticProvider) -> HybridRanker {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(provider);
    let index = EmbeddingIndex::new(CachedEmbedder::new(provider, Arc::new(EmbeddingCache::new())));
    HybridRanker::new(Arc::new(index), RankerConfig::default()).unwrap()
}

fn files() -> Vec<SourceFile> {
    vec![
        SourceFile::new("src/auth/login.ts", LOGIN_TS),
        SourceFile::new("src/auth/verify.ts", VERIFY_TS),
        SourceFile::new("src/session/token.ts", BOTH_TS),
        SourceFile::new("src/math.ts", MATH_TS),
    ]
}

#[tokio::test]
async fn structural_and_semantic_matches_both_surface() {
    let results = ranker(provider()).rank("login", &files()).await;
    let by_path: HashMap<&str, _> = results.iter().map(|r| (r.path.as_str(), r)).collect();

    let structural = by_path["src/auth/login.ts"];
    assert!(structural.ast_score > 0.0);
    assert_eq!(structural.llm_score, 0.0);
    assert!(!structural.has_synergy);

    let semantic = by_path["src/auth/verify.ts"];
    assert_eq!(semantic.ast_score, 0.0);
    assert!(semantic.llm_score > 0.0);
    assert!(!semantic.has_synergy);

    let both = by_path["src/session/token.ts"];
    assert!(both.ast_score > 0.0 && both.llm_score > 0.0);
    assert!(both.has_synergy);

    let unrelated = by_path["src/math.ts"];
    assert_eq!(unrelated.final_score, 0.0);
    assert_eq!(unrelated.classification, Classification::Unrelated);

    assert_eq!(results[0].path, "src/session/token.ts");
    assert_eq!(results.last().map(|r| r.path.as_str()), Some("src/math.ts"));
    for pair in results.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
}

#[tokio::test]
async fn ranking_is_deterministic() {
    let ranker = ranker(provider());
    let first = ranker.rank("login", &files()).await;

    let mut reversed = files();
    reversed.reverse();
    let second = ranker.rank("login", &reversed).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn ties_break_by_path() {
    let ranker = ranker(StaticProvider::default());
    let results = ranker
        .rank(
            "nothing",
            &[
                SourceFile::new("b.ts", "const x = 1;"),
                SourceFile::new("a.ts", "const y = 2;"),
            ],
        )
        .await;
    let paths: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["a.ts", "b.ts"]);
}

#[tokio::test]
async fn embedding_failure_degrades_to_structural_score() {
    let mut provider = provider();
    provider.failing.push(LOGIN_TS.to_string());
    let results = ranker(provider).rank("login", &files()).await;

    let login = results
        .iter()
        .find(|r| r.path == "src/auth/login.ts")
        .unwrap();
    assert_eq!(login.llm_score, 0.0);
    assert!(login.ast_score > 0.0);
}

#[tokio::test]
async fn query_embedding_failure_ranks_structurally() {
    let mut provider = provider();
    provider.failing.push("login".to_string());
    let results = ranker(provider).rank("login", &files()).await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.llm_score == 0.0));
    assert!(results[0].ast_score > 0.0);
}

#[tokio::test]
async fn newer_search_supersedes_older() {
    let mut provider = provider();
    provider.blocking.push("slow query".to_string());
    let blocked = Arc::clone(&provider.blocked);
    let session = Arc::new(SearchSession::new(Arc::new(ranker(provider))));

    let slow = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.search("slow query", &files()).await }
    });
    blocked.notified().await;

    let fast = session.search("login", &files()).await.unwrap();
    assert_eq!(fast.generation, 2);

    let slow = slow.await.unwrap();
    assert!(matches!(slow, Err(SearchError::Superseded)));

    let latest = session.latest().unwrap();
    assert_eq!(latest.query, "login");
    assert_eq!(*session.subscribe().borrow(), Some(fast));
}
