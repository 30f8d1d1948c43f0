//! Export, import and closure resolution.
//!
//! The export document is the canonical `context-sets.json` shape: sets keyed
//! by their prefixed name and a `filesIndex` holding every file the sets
//! mention. Maps are ordered, so exporting the same repository twice yields
//! byte-identical output.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SetError};
use crate::manifest::{FileManifest, FileManifestEntry};
use crate::model::{
    ContextSet, EntryPoint, FileReference, FunctionRef, SystemBehavior, WorkflowStep,
};
use crate::name;
use crate::repository::Repository;

/// The `context-sets.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// Sets keyed by prefixed name.
    pub sets: BTreeMap<String, ExportedSet>,

    /// Files keyed by manifest id.
    #[serde(default)]
    pub files_index: BTreeMap<String, IndexedFile>,
}

/// A set as it appears in the export document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub files: Vec<FileReference>,

    #[serde(default)]
    pub workflows: Vec<WorkflowStep>,

    /// Prefixed names of used sets.
    #[serde(default)]
    pub uses: Vec<String>,

    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_behavior: Option<SystemBehavior>,
}

/// A `filesIndex` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl From<&ContextSet> for ExportedSet {
    fn from(set: &ContextSet) -> Self {
        Self {
            description: set.description.clone(),
            files: set.files.clone(),
            workflows: set.workflows.clone(),
            uses: set.uses.iter().map(|used| name::prefixed(used.as_str())).collect(),
            entry_points: set.entry_points.clone(),
            system_behavior: set.system_behavior,
        }
    }
}

impl From<&FileManifestEntry> for IndexedFile {
    fn from(entry: &FileManifestEntry) -> Self {
        Self {
            path: entry.path.clone(),
            comment: entry.comment.clone(),
        }
    }
}

impl ExportDocument {
    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Parse a document. Invariants are checked by
    /// [`Repository::from_document`], not here.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(SetError::from)
    }
}

/// Export every set and the whole manifest.
pub fn export_all(repo: &Repository) -> ExportDocument {
    ExportDocument {
        sets: repo
            .sets()
            .map(|set| (name::prefixed(&set.name), ExportedSet::from(set)))
            .collect(),
        files_index: repo
            .manifest()
            .iter()
            .map(|entry| (entry.id.clone(), IndexedFile::from(entry)))
            .collect(),
    }
}

/// Export `root` together with every set it transitively uses.
///
/// Only files mentioned by those sets are included in `filesIndex`.
pub fn export_set(repo: &Repository, root: &str) -> Result<ExportDocument> {
    let mut document = ExportDocument::default();
    for set_name in repo.transitive_uses(root)? {
        let Some(set) = repo.get(set_name) else {
            continue;
        };
        for id in set.referenced_file_ids() {
            if let Some(entry) = repo.manifest().get(id) {
                document
                    .files_index
                    .entry(entry.id.clone())
                    .or_insert_with(|| IndexedFile::from(entry));
            }
        }
        document
            .sets
            .insert(name::prefixed(&set.name), ExportedSet::from(set));
    }

    debug!(
        "Exported {} with {} sets and {} files",
        name::prefixed(root),
        document.sets.len(),
        document.files_index.len()
    );
    Ok(document)
}

impl Repository {
    /// Rebuild a repository from an export document.
    ///
    /// Everything is validated: set names, duplicate names after prefix
    /// stripping, dangling file references, unknown used sets and cycles.
    pub fn from_document(document: ExportDocument) -> Result<Self> {
        let mut manifest = FileManifest::new();
        for (id, file) in document.files_index {
            manifest.insert_entry(FileManifestEntry {
                id,
                path: file.path,
                comment: file.comment,
            })?;
        }

        let sets = document
            .sets
            .into_iter()
            .map(|(key, exported)| ContextSet {
                name: name::strip_prefix(&key).to_string(),
                description: exported.description,
                files: exported.files,
                workflows: exported.workflows,
                uses: exported
                    .uses
                    .iter()
                    .map(|used| name::strip_prefix(used).to_string())
                    .collect(),
                entry_points: exported.entry_points,
                system_behavior: exported.system_behavior,
            })
            .collect();

        Self::from_parts(manifest, sets)
    }
}

/// How a file is included in a resolved closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inclusion {
    /// The entire file.
    WholeFile,
    /// Only these declarations.
    Functions(Vec<FunctionRef>),
}

impl Inclusion {
    fn merge(&mut self, reference: &FileReference) {
        match (&mut *self, reference) {
            (Self::WholeFile, _) => {}
            (Self::Functions(_), FileReference::WholeFile(_)) => *self = Self::WholeFile,
            (Self::Functions(refs), FileReference::Partial(partial)) => {
                for function in partial.function_refs() {
                    if !refs.iter().any(|r| r.name == function.name) {
                        refs.push(function.clone());
                    }
                }
            }
        }
    }
}

impl From<&FileReference> for Inclusion {
    fn from(reference: &FileReference) -> Self {
        if reference.is_whole_file() {
            Self::WholeFile
        } else {
            let mut refs: Vec<FunctionRef> = Vec::new();
            for function in reference.function_refs() {
                if !refs.iter().any(|r| r.name == function.name) {
                    refs.push(function.clone());
                }
            }
            Self::Functions(refs)
        }
    }
}

/// A file in a resolved closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile<'a> {
    pub entry: &'a FileManifestEntry,
    pub inclusion: Inclusion,
    /// Comment of the first partial reference that mentioned the file.
    pub comment: Option<&'a str>,
}

/// A set together with everything it transitively uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClosure<'a> {
    /// The set the closure was resolved from.
    pub root: &'a ContextSet,

    /// Root first, then used sets in depth-first pre-order.
    pub sets: Vec<&'a ContextSet>,

    /// Files deduplicated by id, in order of first appearance.
    pub files: Vec<ResolvedFile<'a>>,
}

/// Union the files of `root` and every set it transitively uses.
///
/// A whole-file reference anywhere in the closure wins over function-level
/// references to the same file. Function refs from different sets are
/// unioned by name; the first occurrence of a name is kept.
pub fn resolve_closure<'a>(repo: &'a Repository, root: &str) -> Result<ResolvedClosure<'a>> {
    let names = repo.transitive_uses(root)?;
    let sets: Vec<&ContextSet> = names.into_iter().filter_map(|n| repo.get(n)).collect();
    let Some(root) = sets.first().copied() else {
        return Err(SetError::SetNotFound(name::strip_prefix(root).to_string()));
    };

    let mut files: Vec<ResolvedFile<'a>> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for set in sets.iter().copied() {
        for reference in &set.files {
            let id = reference.file_id();
            if let Some(&pos) = positions.get(id) {
                files[pos].inclusion.merge(reference);
                continue;
            }
            let entry = repo
                .manifest()
                .get(id)
                .ok_or_else(|| SetError::FileNotFound(id.to_string()))?;
            positions.insert(id, files.len());
            files.push(ResolvedFile {
                entry,
                inclusion: Inclusion::from(reference),
                comment: reference.comment(),
            });
        }
    }

    Ok(ResolvedClosure { root, sets, files })
}

impl ResolvedClosure<'_> {
    /// Paths of all files in the closure.
    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.entry.path.as_str()).collect()
    }

    /// Names of all sets in the closure.
    pub fn set_names(&self) -> HashSet<&str> {
        self.sets.iter().map(|s| s.name.as_str()).collect()
    }
}
