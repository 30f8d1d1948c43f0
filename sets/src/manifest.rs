//! File manifest.
//!
//! The manifest is the deduplicated registry of every file a project has
//! referenced. Each path gets a stable id derived from the path itself, so
//! resolving the same path always yields the same id. Entries are never
//! removed implicitly: dropping the last reference from a set leaves the
//! entry in place until [`FileManifest::prune`] is called.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, SetError};

/// Number of hex characters of the path digest used for ids.
const ID_HEX_LEN: usize = 12;

/// A file registered in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifestEntry {
    /// Stable id.
    pub id: String,

    /// Project-relative path, `/`-separated.
    pub path: String,

    /// Free-text note about the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Registry mapping file ids to paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
    /// Entries by id.
    entries: BTreeMap<String, FileManifestEntry>,

    /// Reverse lookup from normalized path to id.
    by_path: HashMap<String, String>,
}

impl FileManifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a path for lookup: `/` separators, no leading `./`.
    pub fn normalize_path(path: &str) -> String {
        let path = path.trim().replace('\\', "/");
        let mut path = path.as_str();
        while let Some(rest) = path.strip_prefix("./") {
            path = rest;
        }
        path.to_string()
    }

    /// Derive the id for a normalized path.
    fn derive_id(path: &str, len: usize) -> String {
        let digest = format!("{:x}", Sha256::digest(path.as_bytes()));
        format!("f{}", &digest[..len.min(digest.len())])
    }

    /// Return the id for `path`, registering the path if it is new.
    ///
    /// Ids are a digest of the normalized path, widened only in the unlikely
    /// case that the short digest is already taken by another path.
    pub fn resolve_path(&mut self, path: &str) -> String {
        let path = Self::normalize_path(path);
        if let Some(id) = self.by_path.get(&path) {
            return id.clone();
        }

        let mut len = ID_HEX_LEN;
        let mut id = Self::derive_id(&path, len);
        while self.entries.contains_key(&id) && len < 64 {
            len += 4;
            id = Self::derive_id(&path, len);
        }

        debug!("Registered {path} as {id}");
        self.by_path.insert(path.clone(), id.clone());
        self.entries.insert(
            id.clone(),
            FileManifestEntry {
                id: id.clone(),
                path,
                comment: None,
            },
        );
        id
    }

    /// Insert an entry with a known id, as read from an export document.
    pub(crate) fn insert_entry(&mut self, entry: FileManifestEntry) -> Result<()> {
        let path = Self::normalize_path(&entry.path);
        if self.entries.contains_key(&entry.id) {
            return Err(SetError::InvalidFormat(format!(
                "duplicate file id {}",
                entry.id
            )));
        }
        if self.by_path.contains_key(&path) {
            return Err(SetError::InvalidFormat(format!("duplicate file path {path}")));
        }

        self.by_path.insert(path.clone(), entry.id.clone());
        self.entries.insert(
            entry.id.clone(),
            FileManifestEntry {
                id: entry.id,
                path,
                comment: entry.comment,
            },
        );
        Ok(())
    }

    /// Get an entry by id.
    pub fn get(&self, id: &str) -> Option<&FileManifestEntry> {
        self.entries.get(id)
    }

    /// Look up the id of a path without registering it.
    pub fn id_for_path(&self, path: &str) -> Option<&str> {
        self.by_path
            .get(&Self::normalize_path(path))
            .map(String::as_str)
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Set or clear the comment of an entry.
    pub fn set_comment(&mut self, id: &str, comment: Option<String>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| SetError::FileNotFound(id.to_string()))?;
        entry.comment = comment.filter(|c| !c.trim().is_empty());
        Ok(())
    }

    /// Remove every entry whose id is not in `keep`, returning the removed
    /// entries.
    pub fn prune(&mut self, keep: impl Fn(&str) -> bool) -> Vec<FileManifestEntry> {
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !keep(id))
            .cloned()
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(entry) = self.entries.remove(&id) {
                self.by_path.remove(&entry.path);
                removed.push(entry);
            }
        }
        removed
    }

    /// Iterate entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &FileManifestEntry> {
        self.entries.values()
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_path_is_stable() {
        let mut manifest = FileManifest::new();
        let first = manifest.resolve_path("src/login.ts");
        let second = manifest.resolve_path("src/login.ts");
        assert_eq!(first, second);
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_resolve_path_is_independent_of_manifest() {
        let mut a = FileManifest::new();
        let mut b = FileManifest::new();
        b.resolve_path("src/other.ts");
        assert_eq!(a.resolve_path("src/login.ts"), b.resolve_path("src/login.ts"));
    }

    #[test]
    fn test_equivalent_spellings_share_an_id() {
        let mut manifest = FileManifest::new();
        let id = manifest.resolve_path("./src/login.ts");
        assert_eq!(manifest.resolve_path("src\\login.ts"), id);
        assert_eq!(manifest.get(&id).unwrap().path, "src/login.ts");
    }

    #[test]
    fn test_comment_and_prune() {
        let mut manifest = FileManifest::new();
        let keep = manifest.resolve_path("keep.rs");
        let drop = manifest.resolve_path("drop.rs");
        manifest.set_comment(&keep, Some("entry".to_string())).unwrap();
        assert!(manifest.set_comment("missing", None).is_err());

        let removed = manifest.prune(|id| id == keep);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, drop);
        assert!(manifest.id_for_path("drop.rs").is_none());
        assert_eq!(manifest.get(&keep).unwrap().comment.as_deref(), Some("entry"));
    }

    #[test]
    fn test_insert_entry_rejects_duplicates() {
        let mut manifest = FileManifest::new();
        let entry = FileManifestEntry {
            id: "f1".to_string(),
            path: "a.rs".to_string(),
            comment: None,
        };
        manifest.insert_entry(entry.clone()).unwrap();
        assert!(manifest.insert_entry(entry).is_err());
        assert!(
            manifest
                .insert_entry(FileManifestEntry {
                    id: "f2".to_string(),
                    path: "./a.rs".to_string(),
                    comment: None,
                })
                .is_err()
        );
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn resolve_path_is_pure(path in "[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.(rs|ts|py)", noise in proptest::collection::vec("[a-z]{1,8}\\.rs", 0..8)) {
                let mut manifest = FileManifest::new();
                let first = manifest.resolve_path(&path);
                for other in &noise {
                    manifest.resolve_path(other);
                }
                prop_assert_eq!(manifest.resolve_path(&path), first);
            }
        }
    }
}
