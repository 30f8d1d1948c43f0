//! # Context Sets
//!
//! Named, reusable bundles of source references for AI tools.
//!
//! A [`Repository`] owns every [`ContextSet`] and the [`FileManifest`] they
//! point into. Sets may *use* other sets; the `uses` graph is kept acyclic
//! and every mutation is validated before it is applied.
//!
//! ## Modules
//!
//! - [`manifest`]: stable file ids and paths
//! - [`repository`]: set creation, editing and the dependency graph
//! - [`export`]: the `context-sets.json` document, import and closure
//!   resolution
//! - [`render`]: Markdown output of a resolved set
//! - [`storage`]: atomic working-copy persistence
//! - [`source`] and [`tokens`]: file contents and token estimates
//! - [`observe`]: change notification for UI or session layers
//!
//! ## Example
//!
//! ```
//! use contextual_sets::{Repository, export_set};
//!
//! let mut repo = Repository::new();
//! repo.create("auth")?;
//! repo.create("api")?;
//! repo.add_path_to_set("auth", "src/login.ts")?;
//! repo.add_use("api", "auth")?;
//!
//! let document = export_set(&repo, "context:api")?;
//! assert!(document.sets.contains_key("context:auth"));
//! # Ok::<(), contextual_sets::SetError>(())
//! ```

pub mod error;
pub mod export;
pub mod manifest;
pub mod model;
pub mod name;
pub mod observe;
pub mod render;
pub mod repository;
pub mod source;
pub mod storage;
pub mod tokens;

pub use error::{ErrorCategory, Result, SetError};
pub use export::{
    ExportDocument, ExportedSet, Inclusion, IndexedFile, ResolvedClosure, ResolvedFile,
    export_all, export_set, resolve_closure,
};
pub use manifest::{FileManifest, FileManifestEntry};
pub use model::{
    ContextSet, EntryPoint, FileReference, FunctionRef, Move, PartialFile, Processing,
    ProcessingMode, Protocol, SystemBehavior, WorkflowStep,
};
pub use observe::Observed;
pub use render::{MarkdownView, render_markdown};
pub use repository::Repository;
pub use source::{FileSource, FsFileSource, MemoryFileSource};
pub use storage::{JsonWorkingCopy, WorkingCopyStore};
pub use tokens::{TokenEstimate, estimate_token_count, estimate_tokens};
