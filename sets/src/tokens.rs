//! Token count estimate for a set.
//!
//! The estimate is the character count of every file in the resolved
//! closure divided by four. Function-level references still count the whole
//! file, so the figure is an upper bound for partial inclusions.

use tracing::warn;

use crate::error::Result;
use crate::export::resolve_closure;
use crate::repository::Repository;
use crate::source::FileSource;

/// Rough tokens for a piece of text (four characters per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Result of [`estimate_token_count`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenEstimate {
    /// Estimated tokens over all readable files.
    pub tokens: usize,

    /// Number of files that were read.
    pub files_read: usize,

    /// Paths that could not be read.
    pub unreadable: Vec<String>,
}

/// Estimate the token count of a set's resolved closure.
///
/// Unreadable files are listed in the result rather than failing the
/// estimate.
pub async fn estimate_token_count(
    repo: &Repository,
    set_name: &str,
    source: &dyn FileSource,
) -> Result<TokenEstimate> {
    let closure = resolve_closure(repo, set_name)?;

    let mut estimate = TokenEstimate::default();
    for file in &closure.files {
        match source.read_file(&file.entry.path).await {
            Ok(content) => {
                estimate.tokens += estimate_tokens(&content);
                estimate.files_read += 1;
            }
            Err(e) => {
                warn!("Skipping {} in token estimate: {e}", file.entry.path);
                estimate.unreadable.push(file.entry.path.clone());
            }
        }
    }
    Ok(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryFileSource;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn test_estimate_over_closure() {
        let mut repo = Repository::new();
        repo.create("auth").unwrap();
        repo.create("api").unwrap();
        repo.add_path_to_set("auth", "src/login.ts").unwrap();
        repo.add_path_to_set("api", "src/routes.ts").unwrap();
        repo.add_path_to_set("api", "src/gone.ts").unwrap();
        repo.add_use("api", "auth").unwrap();

        let source = MemoryFileSource::new()
            .with_file("src/login.ts", "x".repeat(40))
            .with_file("src/routes.ts", "y".repeat(8));

        let estimate = estimate_token_count(&repo, "api", &source).await.unwrap();
        assert_eq!(
            estimate,
            TokenEstimate {
                tokens: 12,
                files_read: 2,
                unreadable: vec!["src/gone.ts".to_string()],
            }
        );
    }
}
