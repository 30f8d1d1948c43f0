//! Implementations of the `ctx` subcommands.
//!
//! Each command loads the working copy, applies one change through
//! [`Repository`] and saves it again. Commands return the text to print on
//! stdout; logging goes to stderr.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use contextual_embeddings::{BatchConfig, BatchItem, BatchProgress, EmbeddingIndex, embed_batch};
use contextual_search::{Classification, HybridRanker, RankedResult, RankerConfig, analyze};
use contextual_sets::{
    FileManifest, FunctionRef, Repository, estimate_token_count, export_all, export_set,
    render_markdown,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EmbeddingSettings;
use crate::project::Project;

/// Output format of `ctx export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Json,
    Markdown,
}

pub async fn init(project: &Project) -> Result<String> {
    let path = project.working_copy().display();
    if project.init().await? {
        Ok(format!("Initialized {path}"))
    } else {
        Ok(format!("{path} already exists"))
    }
}

pub async fn create(project: &Project, name: &str, description: Option<String>) -> Result<String> {
    let mut repo = project.load().await?;
    let created = repo.create(name)?.name.clone();
    if description.is_some() {
        repo.set_description(&created, description)?;
    }
    project.save(&repo).await?;
    Ok(format!("Created set {created}"))
}

pub async fn describe(project: &Project, name: &str, description: Option<String>) -> Result<String> {
    let mut repo = project.load().await?;
    repo.set_description(name, description)?;
    project.save(&repo).await?;
    Ok(format!("Updated description of {name}"))
}

pub async fn delete(project: &Project, name: &str) -> Result<String> {
    let mut repo = project.load().await?;
    let removed = repo.delete(name)?;
    project.save(&repo).await?;
    Ok(format!("Deleted set {}", removed.name))
}

pub async fn rename(project: &Project, old_name: &str, new_name: &str) -> Result<String> {
    let mut repo = project.load().await?;
    repo.rename(old_name, new_name)?;
    project.save(&repo).await?;
    Ok(format!("Renamed {old_name} to {new_name}"))
}

pub async fn add_files(project: &Project, set_name: &str, paths: &[String]) -> Result<String> {
    let mut repo = project.load().await?;
    let mut out = String::new();
    for path in paths {
        let relative = project.relative_path(path)?;
        let (id, added) = repo.add_path_to_set(set_name, &relative)?;
        if added {
            let _ = writeln!(out, "Added {relative} ({id})");
        } else {
            let _ = writeln!(out, "{relative} is already in {set_name}");
        }
    }
    project.save(&repo).await?;
    Ok(out.trim_end().to_string())
}

/// Look up a file id by path. The file may no longer exist on disk.
fn file_id_for(repo: &Repository, path: &str) -> Result<String> {
    let normalized = FileManifest::normalize_path(path);
    repo.manifest()
        .id_for_path(&normalized)
        .map(str::to_string)
        .with_context(|| format!("{normalized} is not a known file"))
}

pub async fn remove_file(project: &Project, set_name: &str, path: &str) -> Result<String> {
    let mut repo = project.load().await?;
    let id = file_id_for(&repo, path)?;
    if !repo.remove_file_from_set(set_name, &id)? {
        bail!("{path} is not in {set_name}");
    }
    project.save(&repo).await?;
    Ok(format!("Removed {path} from {set_name}"))
}

/// Point a set's reference to `path` at specific functions.
///
/// Line numbers are filled from the structural analyzer where a declaration
/// with that name exists. No names turns the reference back into a
/// whole-file reference.
pub async fn refs(
    project: &Project,
    set_name: &str,
    path: &str,
    names: &[String],
    comment: Option<String>,
) -> Result<String> {
    let mut repo = project.load().await?;
    let relative = project.relative_path(path)?;
    let content = tokio::fs::read_to_string(project.root().join(&relative))
        .await
        .with_context(|| format!("failed to read {relative}"))?;
    let analysis = analyze(&content, &relative);

    let function_refs: Vec<FunctionRef> = names
        .iter()
        .map(|name| {
            let line = analysis
                .declarations()
                .find(|d| &d.name == name)
                .and_then(|d| u32::try_from(d.start_line).ok());
            match line {
                Some(line) => FunctionRef::new(name.as_str()).at_line(line),
                None => {
                    warn!("No declaration named {name} in {relative}");
                    FunctionRef::new(name.as_str())
                }
            }
        })
        .collect();

    let id = repo.resolve_path(&relative);
    repo.set_function_refs(set_name, &id, function_refs)?;
    if comment.is_some() && !repo.set_reference_comment(set_name, &id, comment)? {
        warn!("Whole-file references carry no comment; use the file comment instead");
    }
    project.save(&repo).await?;

    if names.is_empty() {
        Ok(format!("{relative} is included whole in {set_name}"))
    } else {
        Ok(format!(
            "{relative} in {set_name} now references {}",
            names.join(", ")
        ))
    }
}

pub async fn comment(project: &Project, path: &str, comment: Option<String>) -> Result<String> {
    let mut repo = project.load().await?;
    let id = file_id_for(&repo, path)?;
    repo.set_file_comment(&id, comment)?;
    project.save(&repo).await?;
    Ok(format!("Updated comment of {path}"))
}

pub async fn add_use(project: &Project, from: &str, to: &str) -> Result<String> {
    let mut repo = project.load().await?;
    repo.add_use(from, to)?;
    project.save(&repo).await?;
    Ok(format!("{from} now uses {to}"))
}

pub async fn remove_use(project: &Project, from: &str, to: &str) -> Result<String> {
    let mut repo = project.load().await?;
    if !repo.remove_use(from, to)? {
        bail!("{from} does not use {to}");
    }
    project.save(&repo).await?;
    Ok(format!("{from} no longer uses {to}"))
}

pub async fn list(project: &Project) -> Result<String> {
    let repo = project.load().await?;
    if repo.is_empty() {
        return Ok("No context sets".to_string());
    }

    let mut out = String::new();
    for set in repo.sets() {
        let _ = write!(out, "{} ({} files)", set.name, set.files.len());
        if !set.uses.is_empty() {
            let _ = write!(out, " uses {}", set.uses.join(", "));
        }
        if let Some(description) = &set.description {
            let _ = write!(out, ": {description}");
        }
        out.push('\n');
    }
    Ok(out.trim_end().to_string())
}

pub async fn show(project: &Project, set_name: &str) -> Result<String> {
    let repo = project.load().await?;
    Ok(render_markdown(&repo, set_name)?)
}

/// Export one set's closure or the whole repository. Writes to `output`
/// when given, otherwise returns the document.
pub async fn export(
    project: &Project,
    set_name: Option<&str>,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<String> {
    let repo = project.load().await?;
    let document = match (format, set_name) {
        (ExportFormat::Json, Some(name)) => export_set(&repo, name)?.to_json()?,
        (ExportFormat::Json, None) => export_all(&repo).to_json()?,
        (ExportFormat::Markdown, Some(name)) => render_markdown(&repo, name)?,
        (ExportFormat::Markdown, None) => {
            let views = repo
                .names()
                .map(|name| render_markdown(&repo, name))
                .collect::<contextual_sets::Result<Vec<_>>>()?;
            views.join("\n")
        }
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, &document)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok(format!("Wrote {}", path.display()))
        }
        None => Ok(document.trim_end().to_string()),
    }
}

pub async fn tokens(project: &Project, set_name: &str) -> Result<String> {
    let repo = project.load().await?;
    let source = project.file_source();
    let estimate = estimate_token_count(&repo, set_name, &source).await?;

    let mut out = format!(
        "~{} tokens across {} files",
        estimate.tokens, estimate.files_read
    );
    for path in &estimate.unreadable {
        let _ = write!(out, "\nunreadable: {path}");
    }
    Ok(out)
}

pub async fn prune(project: &Project) -> Result<String> {
    let mut repo = project.load().await?;
    let removed = repo.prune_unreferenced();
    project.save(&repo).await?;
    Ok(format!("Pruned {} unreferenced files", removed.len()))
}

/// Options of `ctx search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub json: bool,
    /// Add the top results to this set.
    pub add_to: Option<String>,
    pub top: usize,
}

/// The first `top` results that are related to the query at all.
fn top_related(results: &[RankedResult], top: usize) -> impl Iterator<Item = &RankedResult> {
    results
        .iter()
        .filter(|r| r.classification != Classification::Unrelated)
        .take(top)
}

fn format_results(results: &[RankedResult]) -> String {
    let mut out = String::new();
    for (rank, result) in results.iter().enumerate() {
        let _ = write!(
            out,
            "{:>3}. {:.3}  {}  [{}{}]",
            rank + 1,
            result.final_score,
            result.path,
            result.classification,
            if result.has_synergy { ", synergy" } else { "" },
        );
        let _ = writeln!(
            out,
            "  ast {:.3} llm {:.3}",
            result.ast_score, result.llm_score
        );
        for declaration in &result.matches {
            let _ = writeln!(
                out,
                "       {}:{} {}",
                result.path, declaration.start_line, declaration.name
            );
        }
    }
    out
}

pub async fn search(
    project: &Project,
    settings: &EmbeddingSettings,
    ranker_config: &RankerConfig,
    query: &str,
    options: SearchOptions,
) -> Result<String> {
    let mut config = ranker_config.clone();
    if let Some(limit) = options.limit {
        config = config.with_max_results(limit);
    }

    let files = project.sources(settings).await;
    let index = project.embedding_index(settings).await?;
    let ranker = HybridRanker::new(Arc::clone(&index), config)?;
    let results = ranker.rank(query, &files).await;
    info!("{} results for {query:?}", results.len());
    if index.len().await == files.len() {
        prune_cache(&index).await;
    }

    let mut out = if options.json {
        serde_json::to_string_pretty(&results)?
    } else if results.is_empty() {
        "No results".to_string()
    } else {
        format_results(&results).trim_end().to_string()
    };

    if let Some(set_name) = options.add_to {
        let mut repo = project.load().await?;
        let mut added = 0;
        for result in top_related(&results, options.top) {
            if repo.add_path_to_set(&set_name, &result.path)?.1 {
                added += 1;
            }
        }
        project.save(&repo).await?;
        let _ = write!(out, "\nAdded {added} files to {set_name}");
    }
    Ok(out)
}

/// Embed every project file, reporting progress on stderr.
pub async fn embed(
    project: &Project,
    settings: &EmbeddingSettings,
    cancel: &CancellationToken,
) -> Result<String> {
    let items: Vec<BatchItem> = project
        .sources(settings)
        .await
        .into_iter()
        .map(|file| BatchItem::new(file.path, file.content))
        .collect();
    let index = project.embedding_index(settings).await?;
    let config = BatchConfig::default().with_concurrency(settings.concurrency);

    let report_progress = |progress: BatchProgress| {
        eprint!(
            "\rEmbedding {}/{} ({}%)",
            progress.completed,
            progress.total,
            progress.percent()
        );
        if progress.completed == progress.total {
            eprintln!();
        }
    };
    let report = embed_batch(&index, items, &config, cancel, &report_progress).await?;

    if report.failed.is_empty() {
        prune_cache(&index).await;
    }

    let mut out = format!("Embedded {} files", report.embedded.len());
    for failure in &report.failed {
        let _ = write!(out, "\nfailed: {} ({})", failure.path, failure.error);
    }
    Ok(out)
}

/// Release cache entries for content no project file has any more. Only
/// called after every file was embedded.
async fn prune_cache(index: &EmbeddingIndex) {
    match index.prune_cache().await {
        Ok(removed) => debug!("Pruned {removed} stale embeddings"),
        Err(e) => warn!("Failed to prune the embedding cache: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn hashing_settings(dir: &Path) -> EmbeddingSettings {
        EmbeddingSettings {
            dimension: 64,
            cache_dir: Some(dir.join("cache")),
            ..EmbeddingSettings::default()
        }
    }

    async fn project_with_files(files: &[(&str, &str)]) -> (TempDir, Project) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let project = Project::new(dir.path(), ProjectConfig::default());
        init(&project).await.unwrap();
        (dir, project)
    }

    #[tokio::test]
    async fn test_commands_edit_working_copy() {
        let (_dir, project) = project_with_files(&[
            ("src/auth/login.ts", "export function login() {}\n"),
            ("src/db/pool.ts", "export function connect() {}\n"),
        ])
        .await;

        create(&project, "auth", Some("Login flow".to_string()))
            .await
            .unwrap();
        create(&project, "context:db", None).await.unwrap();
        add_files(&project, "auth", &["src/auth/login.ts".to_string()])
            .await
            .unwrap();
        add_files(&project, "db", &["./src/db/pool.ts".to_string()])
            .await
            .unwrap();
        add_use(&project, "auth", "db").await.unwrap();

        assert!(add_use(&project, "db", "auth").await.is_err());
        assert_eq!(
            list(&project).await.unwrap(),
            "auth (1 files) uses db: Login flow\ndb (1 files)"
        );

        let repo = project.load().await.unwrap();
        assert_eq!(repo.transitive_uses("auth").unwrap(), vec!["auth", "db"]);
    }

    #[tokio::test]
    async fn test_refs_fill_line_numbers() {
        let (_dir, project) = project_with_files(&[(
            "src/token.ts",
            "import x from 'y';\n\nexport function verifyToken(t) {\n  return t;\n}\n",
        )])
        .await;
        create(&project, "auth", None).await.unwrap();

        refs(
            &project,
            "auth",
            "src/token.ts",
            &["verifyToken".to_string(), "missing".to_string()],
            Some("token checks".to_string()),
        )
        .await
        .unwrap();

        let repo = project.load().await.unwrap();
        let id = repo.manifest().id_for_path("src/token.ts").unwrap();
        let reference = repo.get("auth").unwrap().file(id).unwrap();
        assert_eq!(
            reference.function_refs(),
            &[
                FunctionRef::new("verifyToken").at_line(3),
                FunctionRef::new("missing"),
            ]
        );
        assert_eq!(reference.comment(), Some("token checks"));
    }

    #[tokio::test]
    async fn test_remove_file_and_prune() {
        let (_dir, project) = project_with_files(&[("a.rs", "fn a() {}\n")]).await;
        create(&project, "core", None).await.unwrap();
        add_files(&project, "core", &["a.rs".to_string()])
            .await
            .unwrap();

        remove_file(&project, "core", "a.rs").await.unwrap();
        assert!(remove_file(&project, "core", "a.rs").await.is_err());
        assert_eq!(
            prune(&project).await.unwrap(),
            "Pruned 1 unreferenced files"
        );
        assert!(project.load().await.unwrap().manifest().is_empty());
    }

    #[tokio::test]
    async fn test_export_writes_closure() {
        let (dir, project) = project_with_files(&[("a.rs", "fn a() {}\n")]).await;
        create(&project, "core", None).await.unwrap();
        add_files(&project, "core", &["a.rs".to_string()])
            .await
            .unwrap();

        let output = dir.path().join("out.json");
        export(&project, Some("core"), ExportFormat::Json, Some(&output))
            .await
            .unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert!(written["sets"]["context:core"].is_object());
        assert_eq!(written["filesIndex"].as_object().unwrap().len(), 1);

        let markdown = export(&project, Some("core"), ExportFormat::Markdown, None)
            .await
            .unwrap();
        assert!(markdown.contains("a.rs"));
    }

    #[tokio::test]
    async fn test_tokens_counts_closure() {
        let (_dir, project) = project_with_files(&[("a.rs", "12345678")]).await;
        create(&project, "core", None).await.unwrap();
        add_files(&project, "core", &["a.rs".to_string()])
            .await
            .unwrap();

        assert_eq!(
            tokens(&project, "core").await.unwrap(),
            "~2 tokens across 1 files"
        );
    }

    #[tokio::test]
    async fn test_search_adds_top_results() {
        let (dir, project) = project_with_files(&[
            (
                "src/auth/login.ts",
                "export function login(user) {\n  return session(user);\n}\n",
            ),
            ("src/math.ts", "export function add(a, b) { return a + b; }\n"),
        ])
        .await;
        create(&project, "auth", None).await.unwrap();

        let options = SearchOptions {
            limit: None,
            json: true,
            add_to: Some("auth".to_string()),
            top: 1,
        };
        let out = search(
            &project,
            &hashing_settings(dir.path()),
            &RankerConfig::default(),
            "login",
            options,
        )
        .await
        .unwrap();

        assert!(out.ends_with("Added 1 files to auth"));
        let repo = project.load().await.unwrap();
        assert!(repo.manifest().id_for_path("src/auth/login.ts").is_some());
    }

    #[tokio::test]
    async fn test_embed_reports_files() {
        let (dir, project) =
            project_with_files(&[("a.rs", "fn a() {}\n"), ("b.rs", "fn b() {}\n")]).await;

        let out = embed(
            &project,
            &hashing_settings(dir.path()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(out, "Embedded 2 files");
    }

    #[test]
    fn test_unrelated_results_are_never_added() {
        let result = |path: &str, final_score: f32, classification| RankedResult {
            path: path.to_string(),
            ast_score: final_score,
            llm_score: 0.0,
            final_score,
            classification,
            has_synergy: false,
            matches: Vec::new(),
        };
        let results = vec![
            result("src/auth/login.ts", 0.8, Classification::CoreLogic),
            result("src/auth/util.ts", 0.2, Classification::Helper),
            result("src/math.ts", 0.0, Classification::Unrelated),
        ];

        let paths: Vec<&str> = top_related(&results, 5).map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["src/auth/login.ts", "src/auth/util.ts"]);
        assert_eq!(top_related(&results, 1).count(), 1);
    }

    #[tokio::test]
    async fn test_embed_releases_edited_content() {
        let (dir, project) =
            project_with_files(&[("a.rs", "fn a() {}\n"), ("b.rs", "fn b() {}\n")]).await;
        let settings = hashing_settings(dir.path());
        let cached_files = || {
            std::fs::read_dir(dir.path().join("cache"))
                .unwrap()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                .count()
        };

        embed(&project, &settings, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(cached_files(), 2);

        for body in ["fn a() { 1 }\n", "fn a() { 2 }\n"] {
            std::fs::write(dir.path().join("a.rs"), body).unwrap();
            let out = embed(&project, &settings, &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(out, "Embedded 2 files");
            assert_eq!(cached_files(), 2);
        }
    }
}

