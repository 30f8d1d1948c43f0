//! # `ctx`
//!
//! Curate named, composable context sets for a codebase and find the files
//! that belong in them.
//!
//! ```bash
//! ctx init
//! ctx create auth --description "Login and session handling"
//! ctx add-file auth src/auth/login.ts src/auth/session.ts
//! ctx refs auth src/auth/token.ts verifyToken refreshToken
//! ctx use auth database
//! ctx search "token refresh" --add-to auth --top 3
//! ctx export auth --format markdown
//! ```
//!
//! Sets live in `context-sets.json` in the project root.

mod commands;
mod config;
mod project;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{ExportFormat, SearchOptions};
use crate::config::CliConfig;
use crate::project::Project;

#[derive(Parser)]
#[command(name = "ctx", version, about = "Curate and search context sets for AI tools")]
struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// Defaults to `<config dir>/contextual/config.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project root; defaults to the current directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty `context-sets.json` in the project root.
    Init,

    /// Create a context set.
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Set or clear a set's description.
    Describe {
        name: String,
        /// New description; omit to clear.
        description: Option<String>,
    },

    /// Delete a context set and every `uses` edge pointing at it.
    Delete { name: String },

    /// Rename a context set.
    Rename { old_name: String, new_name: String },

    /// Add whole files to a set.
    AddFile {
        set: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Remove a file from a set.
    RemoveFile { set: String, path: String },

    /// Narrow a set's reference to a file down to named functions.
    ///
    /// Without names the whole file is included again.
    Refs {
        set: String,
        path: String,
        names: Vec<String>,
        /// Note attached to the partial reference.
        #[arg(long)]
        comment: Option<String>,
    },

    /// Set or clear the note attached to a file.
    Comment {
        path: String,
        comment: Option<String>,
    },

    /// Make one set use another.
    Use { set: String, uses: String },

    /// Remove a `uses` edge.
    Unuse { set: String, uses: String },

    /// List all sets.
    List,

    /// Print a set and everything it uses as Markdown.
    Show { set: String },

    /// Export one set's closure, or every set.
    Export {
        set: Option<String>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Estimate the token count of a set's closure.
    Tokens { set: String },

    /// Drop files no set references from the file index.
    Prune,

    /// Rank project files against a query.
    Search {
        query: String,
        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
        /// Print results as JSON.
        #[arg(long)]
        json: bool,
        /// Add the top results to this set.
        #[arg(long)]
        add_to: Option<String>,
        /// Number of results added with `--add-to`.
        #[arg(long, default_value_t = 5)]
        top: usize,
    },

    /// Embed every project file ahead of searching.
    Embed,
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted; cancelling");
            token.cancel();
        }
    });
}

async fn run(cli: Cli, config: CliConfig) -> Result<String> {
    let project = Project::locate(cli.root, config.project)?;
    debug!("Project root: {}", project.root().display());

    match cli.command {
        Commands::Init => commands::init(&project).await,
        Commands::Create { name, description } => {
            commands::create(&project, &name, description).await
        }
        Commands::Describe { name, description } => {
            commands::describe(&project, &name, description).await
        }
        Commands::Delete { name } => commands::delete(&project, &name).await,
        Commands::Rename { old_name, new_name } => {
            commands::rename(&project, &old_name, &new_name).await
        }
        Commands::AddFile { set, paths } => commands::add_files(&project, &set, &paths).await,
        Commands::RemoveFile { set, path } => commands::remove_file(&project, &set, &path).await,
        Commands::Refs {
            set,
            path,
            names,
            comment,
        } => commands::refs(&project, &set, &path, &names, comment).await,
        Commands::Comment { path, comment } => commands::comment(&project, &path, comment).await,
        Commands::Use { set, uses } => commands::add_use(&project, &set, &uses).await,
        Commands::Unuse { set, uses } => commands::remove_use(&project, &set, &uses).await,
        Commands::List => commands::list(&project).await,
        Commands::Show { set } => commands::show(&project, &set).await,
        Commands::Export {
            set,
            format,
            output,
        } => commands::export(&project, set.as_deref(), format, output.as_deref()).await,
        Commands::Tokens { set } => commands::tokens(&project, &set).await,
        Commands::Prune => commands::prune(&project).await,
        Commands::Search {
            query,
            limit,
            json,
            add_to,
            top,
        } => {
            let options = SearchOptions {
                limit,
                json,
                add_to,
                top,
            };
            commands::search(&project, &config.embedding, &config.ranker, &query, options).await
        }
        Commands::Embed => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            commands::embed(&project, &config.embedding, &cancel).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    init_logging(&config.log_level);

    let output = run(cli, config).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_export() {
        let cli = Cli::try_parse_from([
            "ctx", "--root", "/tmp/p", "export", "auth", "--format", "markdown",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/p")));
        assert!(matches!(
            cli.command,
            Commands::Export {
                set: Some(ref set),
                format: ExportFormat::Markdown,
                output: None,
            } if set == "auth"
        ));
    }
}
