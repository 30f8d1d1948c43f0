//! Context set data model.
//!
//! A [`ContextSet`] bundles file references, an ordered workflow, declared
//! entry points and the names of other sets it uses. The JSON shapes follow
//! the `context-sets.json` export format (camelCase keys, bare string file
//! ids for whole-file references).

use serde::{Deserialize, Serialize};

/// A reference to a declaration inside a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRef {
    /// Function or class name.
    pub name: String,

    /// Free-text note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Line of the declaration, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_index: Option<u32>,
}

impl FunctionRef {
    /// Create a reference by name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            line_index: None,
        }
    }

    /// Set the declaration line.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line_index = Some(line);
        self
    }

    /// Attach a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Function-level inclusion of a file. Always holds at least one ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFile {
    file_id: String,
    function_refs: Vec<FunctionRef>,
    comment: Option<String>,
}

impl PartialFile {
    /// Id of the referenced file.
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Referenced declarations, never empty.
    pub fn function_refs(&self) -> &[FunctionRef] {
        &self.function_refs
    }

    /// Comment on this reference.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

/// How a set includes a file.
///
/// A reference with no function refs is always [`FileReference::WholeFile`];
/// the constructors enforce that, so the two forms never describe the same
/// state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFileReference", into = "RawFileReference")]
pub enum FileReference {
    /// The whole file is included.
    WholeFile(String),
    /// Only some declarations of the file are included.
    Partial(PartialFile),
}

impl FileReference {
    /// Whole-file reference.
    pub fn whole(file_id: impl Into<String>) -> Self {
        Self::WholeFile(file_id.into())
    }

    /// Build a reference, normalizing an empty ref list to the whole file.
    pub fn new(
        file_id: impl Into<String>,
        function_refs: Vec<FunctionRef>,
        comment: Option<String>,
    ) -> Self {
        let file_id = file_id.into();
        if function_refs.is_empty() {
            Self::WholeFile(file_id)
        } else {
            Self::Partial(PartialFile {
                file_id,
                function_refs,
                comment,
            })
        }
    }

    /// Id of the referenced file.
    pub fn file_id(&self) -> &str {
        match self {
            Self::WholeFile(id) => id,
            Self::Partial(partial) => &partial.file_id,
        }
    }

    /// Referenced declarations; empty for whole-file references.
    pub fn function_refs(&self) -> &[FunctionRef] {
        match self {
            Self::WholeFile(_) => &[],
            Self::Partial(partial) => &partial.function_refs,
        }
    }

    /// Comment on a partial reference.
    pub fn comment(&self) -> Option<&str> {
        match self {
            Self::WholeFile(_) => None,
            Self::Partial(partial) => partial.comment(),
        }
    }

    /// Whether the whole file is included.
    pub fn is_whole_file(&self) -> bool {
        matches!(self, Self::WholeFile(_))
    }

    /// Replace the function refs, switching between the two forms as needed.
    ///
    /// The comment of a partial reference survives as long as the result is
    /// still partial.
    pub fn with_function_refs(self, function_refs: Vec<FunctionRef>) -> Self {
        match self {
            Self::WholeFile(id) => Self::new(id, function_refs, None),
            Self::Partial(partial) => Self::new(partial.file_id, function_refs, partial.comment),
        }
    }

    /// Replace the comment. Returns `None` for whole-file references, which
    /// carry no per-set comment.
    pub fn with_comment(self, comment: Option<String>) -> Option<Self> {
        match self {
            Self::WholeFile(_) => None,
            Self::Partial(partial) => Some(Self::Partial(PartialFile {
                comment,
                ..partial
            })),
        }
    }
}

/// JSON union form: bare id string or `{fileRef, functionRefs, comment}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawFileReference {
    Id(String),
    #[serde(rename_all = "camelCase")]
    Object {
        file_ref: String,
        #[serde(default)]
        function_refs: Vec<FunctionRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
}

impl From<RawFileReference> for FileReference {
    fn from(raw: RawFileReference) -> Self {
        match raw {
            RawFileReference::Id(id) => Self::WholeFile(id),
            RawFileReference::Object {
                file_ref,
                function_refs,
                comment,
            } => Self::new(file_ref, function_refs, comment),
        }
    }
}

impl From<FileReference> for RawFileReference {
    fn from(reference: FileReference) -> Self {
        match reference {
            FileReference::WholeFile(id) => Self::Id(id),
            FileReference::Partial(partial) => Self::Object {
                file_ref: partial.file_id,
                function_refs: partial.function_refs,
                comment: partial.comment,
            },
        }
    }
}

/// One step of a set's data-flow description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// What happens in this step.
    pub description: String,

    /// File where it happens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,
}

impl WorkflowStep {
    /// Create a step without a file.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            file_ref: None,
        }
    }

    /// Link the step to a file.
    pub fn in_file(mut self, file_id: impl Into<String>) -> Self {
        self.file_ref = Some(file_id.into());
        self
    }
}

/// Direction for reordering workflow steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Up,
    Down,
}

/// Transport through which an entry point is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Ui,
    Cli,
    Function,
    Queue,
    File,
    Hook,
    Websocket,
    Sse,
}

impl Protocol {
    /// Get a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Ui => "ui",
            Self::Cli => "cli",
            Self::Function => "function",
            Self::Queue => "queue",
            Self::File => "file",
            Self::Hook => "hook",
            Self::Websocket => "websocket",
            Self::Sse => "sse",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "ui" => Ok(Self::Ui),
            "cli" => Ok(Self::Cli),
            "function" => Ok(Self::Function),
            "queue" => Ok(Self::Queue),
            "file" => Ok(Self::File),
            "hook" => Ok(Self::Hook),
            "websocket" => Ok(Self::Websocket),
            "sse" => Ok(Self::Sse),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

/// A declared external access path into a set's functionality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    /// File containing the handler.
    pub file_ref: String,

    /// Handler function name.
    pub function: String,

    /// Transport.
    pub protocol: Protocol,

    /// Protocol-specific method (`GET`, `click`, `run`, ...).
    pub method: String,

    /// Route, command name, queue name, etc.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// How a set's functionality processes work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Synchronous,
    Asynchronous,
    Streaming,
    Batch,
}

/// Processing characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processing {
    pub mode: ProcessingMode,
}

/// Runtime behaviour notes attached to a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemBehavior {
    pub processing: Processing,
}

/// A named bundle of file references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSet {
    /// Bare set name.
    pub name: String,

    /// What this set is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Included files, in insertion order.
    #[serde(default)]
    pub files: Vec<FileReference>,

    /// Ordered workflow.
    #[serde(default)]
    pub workflows: Vec<WorkflowStep>,

    /// Bare names of used sets.
    #[serde(default)]
    pub uses: Vec<String>,

    /// Declared entry points.
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_behavior: Option<SystemBehavior>,
}

impl ContextSet {
    /// Create an empty set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            files: Vec::new(),
            workflows: Vec::new(),
            uses: Vec::new(),
            entry_points: Vec::new(),
            system_behavior: None,
        }
    }

    /// Find the reference to a file.
    pub fn file(&self, file_id: &str) -> Option<&FileReference> {
        self.files.iter().find(|f| f.file_id() == file_id)
    }

    /// Whether the set references a file directly.
    pub fn contains_file(&self, file_id: &str) -> bool {
        self.file(file_id).is_some()
    }

    /// Every file id this set mentions (files, workflow steps, entry points).
    pub fn referenced_file_ids(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .map(FileReference::file_id)
            .chain(self.workflows.iter().filter_map(|w| w.file_ref.as_deref()))
            .chain(self.entry_points.iter().map(|e| e.file_ref.as_str()))
    }

    /// Processing mode, if declared.
    pub fn processing_mode(&self) -> Option<ProcessingMode> {
        self.system_behavior.map(|b| b.processing.mode)
    }
}
