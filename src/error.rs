use std::path::PathBuf;

use crate::types::Stage;

/// All errors produced by gitbatch.
///
/// Validation-class variants are raised before any object is written;
/// see [`Error::is_validation`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate source path: {0}")]
    DuplicateSource(String),

    #[error("duplicate destination path: {0}")]
    DuplicateDestination(String),

    #[error("destination already exists: {0}")]
    DestinationExists(String),

    #[error("source file not found: {0}")]
    SourceNotFound(String),

    #[error("text to replace not found in {path}")]
    TextNotFound { path: String },

    #[error("found {occurrences} occurrences of the text in {path}; the match must be unique")]
    AmbiguousMatch { path: String, occurrences: usize },

    #[error("branch '{branch}' has moved: expected {expected}, found {actual}")]
    RefConflict {
        branch: String,
        expected: String,
        actual: String,
    },

    #[error("timed out while {stage}")]
    Timeout { stage: Stage },

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    #[error("git error: {0}")]
    Git(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

impl Error {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn duplicate_source(path: impl Into<String>) -> Self {
        Self::DuplicateSource(path.into())
    }

    pub fn duplicate_destination(path: impl Into<String>) -> Self {
        Self::DuplicateDestination(path.into())
    }

    pub fn destination_exists(path: impl Into<String>) -> Self {
        Self::DestinationExists(path.into())
    }

    pub fn source_not_found(path: impl Into<String>) -> Self {
        Self::SourceNotFound(path.into())
    }

    pub fn text_not_found(path: impl Into<String>) -> Self {
        Self::TextNotFound { path: path.into() }
    }

    pub fn ambiguous_match(path: impl Into<String>, occurrences: usize) -> Self {
        Self::AmbiguousMatch {
            path: path.into(),
            occurrences,
        }
    }

    pub fn ref_conflict(
        branch: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::RefConflict {
            branch: branch.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn timeout(stage: Stage) -> Self {
        Self::Timeout { stage }
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn invalid_ref_name(name: impl Into<String>) -> Self {
        Self::InvalidRefName(name.into())
    }

    pub fn invalid_edit(msg: impl Into<String>) -> Self {
        Self::InvalidEdit(msg.into())
    }

    pub fn git(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Git(Box::new(err))
    }

    pub fn git_msg(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        Self::Git(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.into().display(), err),
        ))
    }

    /// Map a git2 error, keeping "not found" distinguishable from other failures.
    pub(crate) fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => Self::not_found(context),
            _ => Self::git(err),
        }
    }

    /// `true` for errors raised by request checking, before any object
    /// is written to the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::DuplicateSource(_)
                | Self::DuplicateDestination(_)
                | Self::DestinationExists(_)
                | Self::SourceNotFound(_)
                | Self::TextNotFound { .. }
                | Self::AmbiguousMatch { .. }
                | Self::IsADirectory(_)
                | Self::NotADirectory(_)
                | Self::InvalidPath(_)
                | Self::InvalidRefName(_)
                | Self::InvalidEdit(_)
        )
    }

    /// `true` when another writer moved the branch first.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::RefConflict { .. })
    }
}
