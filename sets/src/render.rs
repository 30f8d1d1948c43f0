//! Markdown rendering of a resolved set, for pasting into AI tools.

use std::fmt;

use crate::error::Result;
use crate::export::{Inclusion, ResolvedClosure, resolve_closure};
use crate::manifest::FileManifest;
use crate::model::ProcessingMode;
use crate::name;
use crate::repository::Repository;

/// Markdown view over a resolved closure.
pub struct MarkdownView<'a> {
    closure: ResolvedClosure<'a>,
    manifest: &'a FileManifest,
}

impl<'a> MarkdownView<'a> {
    pub fn new(closure: ResolvedClosure<'a>, manifest: &'a FileManifest) -> Self {
        Self { closure, manifest }
    }

    fn path_of<'b>(&'b self, file_id: &'b str) -> &'b str {
        self.manifest
            .get(file_id)
            .map_or(file_id, |entry| entry.path.as_str())
    }
}

fn mode_label(mode: ProcessingMode) -> &'static str {
    match mode {
        ProcessingMode::Synchronous => "synchronous",
        ProcessingMode::Asynchronous => "asynchronous",
        ProcessingMode::Streaming => "streaming",
        ProcessingMode::Batch => "batch",
    }
}

impl fmt::Display for MarkdownView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = self.closure.root;
        writeln!(f, "# {}", name::prefixed(&root.name))?;
        if let Some(description) = &root.description {
            writeln!(f)?;
            writeln!(f, "{description}")?;
        }
        if let Some(mode) = root.processing_mode() {
            writeln!(f)?;
            writeln!(f, "Processing: {}", mode_label(mode))?;
        }

        if let Some(used) = self.closure.sets.get(1..).filter(|used| !used.is_empty()) {
            writeln!(f)?;
            writeln!(f, "## Uses")?;
            writeln!(f)?;
            for set in used {
                match &set.description {
                    Some(description) => {
                        writeln!(f, "- {}: {description}", name::prefixed(&set.name))?
                    }
                    None => writeln!(f, "- {}", name::prefixed(&set.name))?,
                }
            }
        }

        if !self.closure.files.is_empty() {
            writeln!(f)?;
            writeln!(f, "## Files")?;
            writeln!(f)?;
            for file in &self.closure.files {
                write!(f, "- `{}`", file.entry.path)?;
                if let Some(comment) = &file.entry.comment {
                    write!(f, ": {comment}")?;
                }
                writeln!(f)?;
                if let Inclusion::Functions(refs) = &file.inclusion {
                    if let Some(comment) = file.comment {
                        writeln!(f, "  - note: {comment}")?;
                    }
                    for function in refs {
                        write!(f, "  - `{}`", function.name)?;
                        if let Some(line) = function.line_index {
                            write!(f, " (line {line})")?;
                        }
                        if let Some(comment) = &function.comment {
                            write!(f, ": {comment}")?;
                        }
                        writeln!(f)?;
                    }
                }
            }
        }

        if !root.workflows.is_empty() {
            writeln!(f)?;
            writeln!(f, "## Workflow")?;
            writeln!(f)?;
            for (i, step) in root.workflows.iter().enumerate() {
                write!(f, "{}. {}", i + 1, step.description)?;
                if let Some(file_id) = &step.file_ref {
                    write!(f, " (`{}`)", self.path_of(file_id))?;
                }
                writeln!(f)?;
            }
        }

        if !root.entry_points.is_empty() {
            writeln!(f)?;
            writeln!(f, "## Entry points")?;
            writeln!(f)?;
            for entry_point in &root.entry_points {
                write!(
                    f,
                    "- {} {}",
                    entry_point.protocol.as_str(),
                    entry_point.method
                )?;
                if let Some(identifier) = &entry_point.identifier {
                    write!(f, " {identifier}")?;
                }
                writeln!(
                    f,
                    ": `{}` in `{}`",
                    entry_point.function,
                    self.path_of(&entry_point.file_ref)
                )?;
            }
        }

        Ok(())
    }
}

/// Render `root` and its closure as Markdown.
pub fn render_markdown(repo: &Repository, root: &str) -> Result<String> {
    let closure = resolve_closure(repo, root)?;
    Ok(MarkdownView::new(closure, repo.manifest()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryPoint, FunctionRef, Protocol, WorkflowStep};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_markdown() {
        let mut repo = Repository::new();
        repo.create("auth").unwrap();
        repo.create("api").unwrap();
        repo.set_description("auth", Some("Login and sessions".to_string()))
            .unwrap();
        let (login, _) = repo.add_path_to_set("auth", "src/login.ts").unwrap();
        repo.set_file_comment(&login, Some("credential check".to_string()))
            .unwrap();
        let routes = repo.resolve_path("src/routes.ts");
        repo.set_function_refs("api", &routes, vec![FunctionRef::new("post").at_line(12)])
            .unwrap();
        repo.add_use("api", "auth").unwrap();
        repo.add_workflow_step("api", WorkflowStep::new("Route request").in_file(&routes))
            .unwrap();
        repo.add_entry_point(
            "api",
            EntryPoint {
                file_ref: routes.clone(),
                function: "post".to_string(),
                protocol: Protocol::Http,
                method: "POST".to_string(),
                identifier: Some("/login".to_string()),
            },
        )
        .unwrap();

        let markdown = render_markdown(&repo, "api").unwrap();
        assert_eq!(
            markdown,
            "# context:api\n\
             \n\
             ## Uses\n\
             \n\
             - context:auth: Login and sessions\n\
             \n\
             ## Files\n\
             \n\
             - `src/routes.ts`\n  \
               - `post` (line 12)\n\
             - `src/login.ts`: credential check\n\
             \n\
             ## Workflow\n\
             \n\
             1. Route request (`src/routes.ts`)\n\
             \n\
             ## Entry points\n\
             \n\
             - http POST /login: `post` in `src/routes.ts`\n"
        );
    }

    #[test]
    fn test_path_of_falls_back_to_id() {
        let mut repo = Repository::new();
        repo.create("core").unwrap();
        let (id, _) = repo.add_path_to_set("core", "src/lib.rs").unwrap();

        let view = MarkdownView::new(resolve_closure(&repo, "core").unwrap(), repo.manifest());
        let unknown = String::from("f000000000000");
        assert_eq!(view.path_of(&id), "src/lib.rs");
        assert_eq!(view.path_of(&unknown), "f000000000000");
    }
}
