use std::time::Duration;

/// Content-derived reference to a blob, tree or commit.
pub type ObjectId = git2::Oid;

// ---------------------------------------------------------------------------
// Mode constants
// ---------------------------------------------------------------------------

pub const MODE_BLOB: u32 = 0o100644;
pub const MODE_BLOB_EXEC: u32 = 0o100755;
pub const MODE_LINK: u32 = 0o120000;
pub const MODE_TREE: u32 = 0o040000;

// ---------------------------------------------------------------------------
// FileType
// ---------------------------------------------------------------------------

/// The type of a git tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Blob,
    Executable,
    Link,
    Tree,
}

impl FileType {
    /// Convert a raw git mode to a `FileType`.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode {
            MODE_BLOB => Some(Self::Blob),
            MODE_BLOB_EXEC => Some(Self::Executable),
            MODE_LINK => Some(Self::Link),
            MODE_TREE => Some(Self::Tree),
            _ => None,
        }
    }

    /// Convert to a raw git mode.
    pub fn to_mode(self) -> u32 {
        match self {
            Self::Blob => MODE_BLOB,
            Self::Executable => MODE_BLOB_EXEC,
            Self::Link => MODE_LINK,
            Self::Tree => MODE_TREE,
        }
    }

    /// Whether this type is a leaf (anything but a directory).
    pub fn is_leaf(self) -> bool {
        !matches!(self, Self::Tree)
    }
}

// ---------------------------------------------------------------------------
// TreeItem
// ---------------------------------------------------------------------------

/// One immediate child of a stored tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    pub name: String,
    pub oid: ObjectId,
    pub mode: u32,
}

impl TreeItem {
    pub fn new(name: impl Into<String>, oid: ObjectId, mode: u32) -> Self {
        Self {
            name: name.into(),
            oid,
            mode,
        }
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }

    pub fn is_tree(&self) -> bool {
        self.mode == MODE_TREE
    }
}

/// Content reference and mode of one file in a snapshot or synthesized tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRef {
    pub oid: ObjectId,
    pub mode: u32,
}

impl FileRef {
    pub fn new(oid: ObjectId, mode: u32) -> Self {
        Self { oid, mode }
    }
}

// ---------------------------------------------------------------------------
// Edit
// ---------------------------------------------------------------------------

/// One requested path-level change. A batch is an ordered `Vec<Edit>`
/// landing as a single commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Create or overwrite a file.
    Write {
        path: String,
        content: Vec<u8>,
        mode: u32,
    },
    /// Replace the single occurrence of `find` in an existing file.
    Replace {
        path: String,
        find: String,
        replacement: String,
    },
    /// Remove a file, or every file under a directory.
    Delete { path: String },
    /// Move a file (or every file under a directory) to a new path.
    Move { from: String, to: String },
}

impl Edit {
    pub fn write(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::write_with_mode(path, content, MODE_BLOB)
    }

    pub fn write_with_mode(path: impl Into<String>, content: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self::Write {
            path: path.into(),
            content: content.into(),
            mode,
        }
    }

    pub fn replace(
        path: impl Into<String>,
        find: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self::Replace {
            path: path.into(),
            find: find.into(),
            replacement: replacement.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::Delete { path: path.into() }
    }

    pub fn move_to(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Move {
            from: from.into(),
            to: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store records
// ---------------------------------------------------------------------------

/// The commit a branch points at, with its root tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchTip {
    pub commit: ObjectId,
    pub tree: ObjectId,
}

/// The parts of a stored commit the engine looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline stage of one batch, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Reading,
    Validating,
    Writing,
    Synthesizing,
    Publishing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Reading => "reading",
            Self::Validating => "validating",
            Self::Writing => "writing",
            Self::Synthesizing => "synthesizing",
            Self::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ChangeReport
// ---------------------------------------------------------------------------

/// Kinds of change actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeActionKind {
    Add,
    Update,
    Delete,
}

/// A single change action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeAction {
    pub kind: ChangeActionKind,
    pub path: String,
}

impl ChangeAction {
    pub fn new(kind: ChangeActionKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

impl PartialOrd for ChangeAction {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChangeAction {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

/// Paths a batch added, updated and deleted, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    pub add: Vec<String>,
    pub update: Vec<String>,
    pub delete: Vec<String>,
}

impl ChangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when nothing was changed.
    pub fn in_sync(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Total number of changes (add + update + delete).
    pub fn total(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }

    /// Return a sorted list of all change actions.
    pub fn actions(&self) -> Vec<ChangeAction> {
        let mut out = Vec::with_capacity(self.total());
        for p in &self.add {
            out.push(ChangeAction::new(ChangeActionKind::Add, p.as_str()));
        }
        for p in &self.update {
            out.push(ChangeAction::new(ChangeActionKind::Update, p.as_str()));
        }
        for p in &self.delete {
            out.push(ChangeAction::new(ChangeActionKind::Delete, p.as_str()));
        }
        out.sort();
        out
    }
}

// ---------------------------------------------------------------------------
// BatchOutcome
// ---------------------------------------------------------------------------

/// Result of a batch that reached a terminal state without error.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub branch: String,
    /// The branch tip after the batch: the new commit, or the old tip when
    /// nothing changed.
    pub commit: ObjectId,
    /// The tip the batch was computed against.
    pub previous: ObjectId,
    pub tree: ObjectId,
    pub message: String,
    /// `false` when the batch netted to no change and no commit was made.
    pub committed: bool,
    pub changes: ChangeReport,
}

impl BatchOutcome {
    /// Every path the commit touched, sorted.
    pub fn changed_paths(&self) -> Vec<String> {
        self.changes.actions().into_iter().map(|a| a.path).collect()
    }
}

// ---------------------------------------------------------------------------
// Signature / options
// ---------------------------------------------------------------------------

/// Author/committer identity.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            name: "gitbatch".into(),
            email: "gitbatch@localhost".into(),
        }
    }
}

/// Options for opening or creating a `GitStore`.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Create the repository if it doesn't exist.
    pub create: bool,
    /// Branch to initialize with an empty commit when creating.
    pub branch: Option<String>,
    /// Default author name.
    pub author: Option<String>,
    /// Default author email.
    pub email: Option<String>,
}

/// Options for an `Engine`.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Deadline for one batch, measured from the start of `Reading`.
    pub timeout: Option<Duration>,
}
