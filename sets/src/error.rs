//! Error types for the context set graph.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for context set operations.
pub type Result<T> = std::result::Result<T, SetError>;

/// Errors that can occur while editing, loading or exporting context sets.
///
/// Every validation error is raised before any state changes, so a caller
/// that receives one can assume the repository is exactly as it was.
#[derive(Error, Debug)]
pub enum SetError {
    /// Set name fails the naming rules.
    #[error("invalid context set name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A set with this name already exists.
    #[error("context set already exists: {0}")]
    DuplicateName(String),

    /// A set may not use itself.
    #[error("context set cannot use itself: {0}")]
    SelfReference(String),

    /// The edge would close a cycle in the `uses` graph.
    #[error("{from} -> {to} would create a circular dependency: {}", cycle.join(" -> "))]
    CircularDependency {
        from: String,
        to: String,
        cycle: Vec<String>,
    },

    /// Context set not found.
    #[error("context set not found: {0}")]
    SetNotFound(String),

    /// File id not present in the manifest (or not in the set).
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Position outside a set's workflow or entry point list.
    #[error("index {index} out of range in {set}")]
    IndexOutOfRange { set: String, index: usize },

    /// Source file does not exist.
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Source file exists but cannot be read.
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Invalid export document.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`SetError`] for callers that only need to
/// decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or duplicate name, malformed input.
    Validation,
    /// Rejected `uses` edge.
    CircularDependency,
    /// Missing set or file.
    NotFound,
    /// Storage or source access failure.
    Io,
}

impl SetError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidName { .. }
            | Self::DuplicateName(_)
            | Self::IndexOutOfRange { .. }
            | Self::InvalidFormat(_) => ErrorCategory::Validation,
            Self::SelfReference(_) | Self::CircularDependency { .. } => {
                ErrorCategory::CircularDependency
            }
            Self::SetNotFound(_) | Self::FileNotFound(_) | Self::SourceNotFound(_) => {
                ErrorCategory::NotFound
            }
            Self::PermissionDenied(_) | Self::Serialization(_) | Self::Io(_) => ErrorCategory::Io,
        }
    }
}
