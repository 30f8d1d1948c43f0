//! The context set repository.
//!
//! [`Repository`] is the single owner of the set graph and the file
//! manifest. Every mutation validates its input first and only then changes
//! state, so a rejected call leaves the repository untouched. Set names may
//! be passed bare or with the `context:` prefix.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::error::{Result, SetError};
use crate::manifest::{FileManifest, FileManifestEntry};
use crate::model::{
    ContextSet, EntryPoint, FileReference, FunctionRef, Move, Processing, ProcessingMode,
    SystemBehavior, WorkflowStep,
};
use crate::name;

/// Owner of all context sets and the file manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repository {
    manifest: FileManifest,
    sets: BTreeMap<String, ContextSet>,
}

impl Repository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository from parts, checking every invariant.
    pub(crate) fn from_parts(manifest: FileManifest, sets: Vec<ContextSet>) -> Result<Self> {
        let mut repo = Self {
            manifest,
            sets: BTreeMap::new(),
        };

        let mut edges = Vec::new();
        for mut set in sets {
            let set_name = name::strip_prefix(&set.name).to_string();
            name::validate(&set_name)?;
            if repo.sets.contains_key(&set_name) {
                return Err(SetError::DuplicateName(set_name));
            }
            if let Some(missing) = set
                .referenced_file_ids()
                .find(|id| !repo.manifest.contains(id))
            {
                return Err(SetError::FileNotFound(missing.to_string()));
            }
            for used in std::mem::take(&mut set.uses) {
                edges.push((set_name.clone(), used));
            }
            set.name = set_name.clone();
            repo.sets.insert(set_name, set);
        }

        for (from, to) in edges {
            repo.add_use(&from, &to)?;
        }

        Ok(repo)
    }

    /// The file manifest.
    pub fn manifest(&self) -> &FileManifest {
        &self.manifest
    }

    /// Get a set by name.
    pub fn get(&self, set_name: &str) -> Option<&ContextSet> {
        self.sets.get(name::strip_prefix(set_name))
    }

    /// Whether a set exists.
    pub fn contains(&self, set_name: &str) -> bool {
        self.get(set_name).is_some()
    }

    /// All set names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// All sets, sorted by name.
    pub fn sets(&self) -> impl Iterator<Item = &ContextSet> {
        self.sets.values()
    }

    /// Get the number of sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Check if there are no sets.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    fn require(&self, set_name: &str) -> Result<&ContextSet> {
        self.get(set_name)
            .ok_or_else(|| SetError::SetNotFound(name::strip_prefix(set_name).to_string()))
    }

    fn require_mut(&mut self, set_name: &str) -> Result<&mut ContextSet> {
        let key = name::strip_prefix(set_name);
        self.sets
            .get_mut(key)
            .ok_or_else(|| SetError::SetNotFound(key.to_string()))
    }

    fn require_file(&self, file_id: &str) -> Result<()> {
        if self.manifest.contains(file_id) {
            Ok(())
        } else {
            Err(SetError::FileNotFound(file_id.to_string()))
        }
    }

    // ---------------------------------------------------------------------
    // Set lifecycle
    // ---------------------------------------------------------------------

    /// Create an empty set.
    pub fn create(&mut self, set_name: &str) -> Result<&ContextSet> {
        let key = name::strip_prefix(set_name).to_string();
        name::validate(&key)?;
        if self.sets.contains_key(&key) {
            return Err(SetError::DuplicateName(key));
        }

        info!("Created context set {key}");
        Ok(self
            .sets
            .entry(key.clone())
            .or_insert_with(|| ContextSet::new(key)))
    }

    /// Delete a set and strip it from every other set's `uses`.
    pub fn delete(&mut self, set_name: &str) -> Result<ContextSet> {
        let key = name::strip_prefix(set_name).to_string();
        let removed = self
            .sets
            .remove(&key)
            .ok_or_else(|| SetError::SetNotFound(key.clone()))?;

        for set in self.sets.values_mut() {
            set.uses.retain(|used| *used != key);
        }

        info!("Deleted context set {key}");
        Ok(removed)
    }

    /// Rename a set, rewriting every `uses` edge that points at it.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let old_key = name::strip_prefix(old_name).to_string();
        let new_key = name::strip_prefix(new_name).to_string();
        self.require(&old_key)?;
        if old_key == new_key {
            return Ok(());
        }
        name::validate(&new_key)?;
        if self.sets.contains_key(&new_key) {
            return Err(SetError::DuplicateName(new_key));
        }

        if let Some(mut set) = self.sets.remove(&old_key) {
            set.name = new_key.clone();
            self.sets.insert(new_key.clone(), set);
        }
        for set in self.sets.values_mut() {
            for used in &mut set.uses {
                if *used == old_key {
                    used.clone_from(&new_key);
                }
            }
        }

        info!("Renamed context set {old_key} to {new_key}");
        Ok(())
    }

    /// Set or clear a set's description.
    pub fn set_description(&mut self, set_name: &str, description: Option<String>) -> Result<()> {
        let set = self.require_mut(set_name)?;
        set.description = description.filter(|d| !d.trim().is_empty());
        Ok(())
    }

    /// Set or clear a set's processing mode.
    pub fn set_processing_mode(
        &mut self,
        set_name: &str,
        mode: Option<ProcessingMode>,
    ) -> Result<()> {
        let set = self.require_mut(set_name)?;
        set.system_behavior = mode.map(|mode| SystemBehavior {
            processing: Processing { mode },
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Dependency graph
    // ---------------------------------------------------------------------

    /// Find the path `to -> ... -> from` through `uses` edges, if any.
    ///
    /// Depth-first from `to`. A node already on the current path is treated
    /// as reaching a cycle as well, although the graph invariant keeps that
    /// from happening.
    fn path_back(&self, from: &str, to: &str) -> Option<Vec<String>> {
        fn visit<'a>(
            sets: &'a BTreeMap<String, ContextSet>,
            current: &'a str,
            target: &str,
            on_path: &mut Vec<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> bool {
            if current == target || on_path.contains(&current) {
                on_path.push(current);
                return true;
            }
            if !done.insert(current) {
                return false;
            }
            on_path.push(current);
            if let Some(set) = sets.get(current) {
                for used in &set.uses {
                    if visit(sets, used, target, on_path, done) {
                        return true;
                    }
                }
            }
            on_path.pop();
            false
        }

        let mut on_path = Vec::new();
        let mut done = HashSet::new();
        if visit(&self.sets, to, from, &mut on_path, &mut done) {
            Some(on_path.into_iter().map(str::to_string).collect())
        } else {
            None
        }
    }

    /// Whether `from` using `to` would introduce a cycle.
    ///
    /// Returns the offending cycle, starting and ending at `from`.
    pub fn would_create_cycle(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let from = name::strip_prefix(from);
        let to = name::strip_prefix(to);
        if from == to {
            return Some(vec![from.to_string(), to.to_string()]);
        }
        self.path_back(from, to).map(|path| {
            std::iter::once(from.to_string())
                .chain(path)
                .collect::<Vec<_>>()
        })
    }

    /// Make `from` use `to`.
    ///
    /// Adding an existing edge is a no-op. The edge is checked for cycles
    /// before it is inserted.
    pub fn add_use(&mut self, from: &str, to: &str) -> Result<()> {
        let from_key = name::strip_prefix(from).to_string();
        let to_key = name::strip_prefix(to).to_string();

        self.require(&from_key)?;
        self.require(&to_key)?;
        if from_key == to_key {
            return Err(SetError::SelfReference(from_key));
        }
        if let Some(cycle) = self.would_create_cycle(&from_key, &to_key) {
            return Err(SetError::CircularDependency {
                from: from_key,
                to: to_key,
                cycle,
            });
        }

        let set = self.require_mut(&from_key)?;
        if !set.uses.contains(&to_key) {
            debug!("{from_key} now uses {to_key}");
            set.uses.push(to_key);
        }
        Ok(())
    }

    /// Remove the edge `from -> to`. Returns whether it existed.
    pub fn remove_use(&mut self, from: &str, to: &str) -> Result<bool> {
        let to_key = name::strip_prefix(to);
        let set = self.require_mut(from)?;
        let before = set.uses.len();
        set.uses.retain(|used| used != to_key);
        Ok(set.uses.len() != before)
    }

    /// Sets that `set_name` uses, directly or transitively, in depth-first
    /// pre-order starting with `set_name` itself.
    pub fn transitive_uses(&self, set_name: &str) -> Result<Vec<&str>> {
        let root = self.require(set_name)?;

        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root.name.as_str()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            if let Some(set) = self.sets.get(current) {
                stack.extend(set.uses.iter().rev().map(String::as_str));
            }
        }
        Ok(order)
    }

    /// Sets that use `set_name` directly.
    pub fn used_by(&self, set_name: &str) -> Vec<&str> {
        let key = name::strip_prefix(set_name);
        self.sets
            .values()
            .filter(|set| set.uses.iter().any(|used| used == key))
            .map(|set| set.name.as_str())
            .collect()
    }

    // ---------------------------------------------------------------------
    // Files
    // ---------------------------------------------------------------------

    /// Return the manifest id for a path, registering it if new.
    pub fn resolve_path(&mut self, path: &str) -> String {
        self.manifest.resolve_path(path)
    }

    /// Set or clear the manifest comment of a file.
    pub fn set_file_comment(&mut self, file_id: &str, comment: Option<String>) -> Result<()> {
        self.manifest.set_comment(file_id, comment)
    }

    /// Add a whole-file reference. Returns `false` if the set already
    /// references the file.
    pub fn add_file_to_set(&mut self, set_name: &str, file_id: &str) -> Result<bool> {
        self.require_file(file_id)?;
        let set = self.require_mut(set_name)?;
        if set.contains_file(file_id) {
            return Ok(false);
        }
        set.files.push(FileReference::whole(file_id));
        debug!("Added {file_id} to {}", set.name);
        Ok(true)
    }

    /// Resolve `path` and add it to a set as a whole file.
    ///
    /// Returns the file id and whether the set changed.
    pub fn add_path_to_set(&mut self, set_name: &str, path: &str) -> Result<(String, bool)> {
        self.require(set_name)?;
        let id = self.resolve_path(path);
        let added = self.add_file_to_set(set_name, &id)?;
        Ok((id, added))
    }

    /// Remove a file from a set's files. The manifest entry stays.
    pub fn remove_file_from_set(&mut self, set_name: &str, file_id: &str) -> Result<bool> {
        let set = self.require_mut(set_name)?;
        let before = set.files.len();
        set.files.retain(|f| f.file_id() != file_id);
        Ok(set.files.len() != before)
    }

    /// Replace the function refs of a file in a set.
    ///
    /// An empty list turns the reference back into a whole-file reference; a
    /// non-empty list narrows it. The file is added to the set if it was not
    /// referenced yet.
    pub fn set_function_refs(
        &mut self,
        set_name: &str,
        file_id: &str,
        refs: Vec<FunctionRef>,
    ) -> Result<()> {
        self.require_file(file_id)?;
        let set = self.require_mut(set_name)?;
        match set.files.iter().position(|f| f.file_id() == file_id) {
            Some(pos) => {
                let current = std::mem::replace(&mut set.files[pos], FileReference::whole(file_id));
                set.files[pos] = current.with_function_refs(refs);
            }
            None => set.files.push(FileReference::new(file_id, refs, None)),
        }
        Ok(())
    }

    /// Set the comment of a partial file reference.
    ///
    /// Returns `false` when the reference covers the whole file; such
    /// references carry no per-set comment (use the manifest comment).
    pub fn set_reference_comment(
        &mut self,
        set_name: &str,
        file_id: &str,
        comment: Option<String>,
    ) -> Result<bool> {
        let set = self.require_mut(set_name)?;
        let reference = set
            .files
            .iter_mut()
            .find(|f| f.file_id() == file_id)
            .ok_or_else(|| SetError::FileNotFound(file_id.to_string()))?;

        // A whole-file reference is left as the placeholder, which equals it.
        let current = std::mem::replace(reference, FileReference::whole(file_id));
        match current.with_comment(comment.filter(|c| !c.trim().is_empty())) {
            Some(updated) => {
                *reference = updated;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove manifest entries that no set references. Returns them.
    pub fn prune_unreferenced(&mut self) -> Vec<FileManifestEntry> {
        let referenced: HashSet<String> = self
            .sets
            .values()
            .flat_map(ContextSet::referenced_file_ids)
            .map(str::to_string)
            .collect();
        let removed = self.manifest.prune(|id| referenced.contains(id));
        if !removed.is_empty() {
            info!("Pruned {} unreferenced files", removed.len());
        }
        removed
    }

    // ---------------------------------------------------------------------
    // Workflow and entry points
    // ---------------------------------------------------------------------

    /// Append a workflow step, returning its index.
    pub fn add_workflow_step(&mut self, set_name: &str, step: WorkflowStep) -> Result<usize> {
        if let Some(file_id) = &step.file_ref {
            self.require_file(file_id)?;
        }
        let set = self.require_mut(set_name)?;
        set.workflows.push(step);
        Ok(set.workflows.len() - 1)
    }

    /// Replace the workflow step at `index`.
    pub fn update_workflow_step(
        &mut self,
        set_name: &str,
        index: usize,
        step: WorkflowStep,
    ) -> Result<()> {
        if let Some(file_id) = &step.file_ref {
            self.require_file(file_id)?;
        }
        let set = self.require_mut(set_name)?;
        match set.workflows.get_mut(index) {
            Some(slot) => {
                *slot = step;
                Ok(())
            }
            None => Err(SetError::IndexOutOfRange {
                set: set.name.clone(),
                index,
            }),
        }
    }

    /// Remove and return the workflow step at `index`.
    pub fn remove_workflow_step(&mut self, set_name: &str, index: usize) -> Result<WorkflowStep> {
        let set = self.require_mut(set_name)?;
        if index >= set.workflows.len() {
            return Err(SetError::IndexOutOfRange {
                set: set.name.clone(),
                index,
            });
        }
        Ok(set.workflows.remove(index))
    }

    /// Move a workflow step one position. Returns `false` if it is already
    /// at that end of the list.
    pub fn move_workflow_step(
        &mut self,
        set_name: &str,
        index: usize,
        direction: Move,
    ) -> Result<bool> {
        let set = self.require_mut(set_name)?;
        let len = set.workflows.len();
        if index >= len {
            return Err(SetError::IndexOutOfRange {
                set: set.name.clone(),
                index,
            });
        }
        let target = match direction {
            Move::Up if index > 0 => index - 1,
            Move::Down if index + 1 < len => index + 1,
            _ => return Ok(false),
        };
        set.workflows.swap(index, target);
        Ok(true)
    }

    /// Declare an entry point.
    pub fn add_entry_point(&mut self, set_name: &str, entry_point: EntryPoint) -> Result<()> {
        self.require_file(&entry_point.file_ref)?;
        let set = self.require_mut(set_name)?;
        set.entry_points.push(entry_point);
        Ok(())
    }

    /// Remove and return the entry point at `index`.
    pub fn remove_entry_point(&mut self, set_name: &str, index: usize) -> Result<EntryPoint> {
        let set = self.require_mut(set_name)?;
        if index >= set.entry_points.len() {
            return Err(SetError::IndexOutOfRange {
                set: set.name.clone(),
                index,
            });
        }
        Ok(set.entry_points.remove(index))
    }
}
