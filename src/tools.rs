//! Single-purpose operations built on [`Engine::apply_batch`].
//!
//! Each function turns one intent into a batch of edits, picks a default
//! commit message when `message` is `None` or blank, and lands the batch as
//! one commit.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::paths;
use crate::store::ObjectStore;
use crate::types::{BatchOutcome, Edit};

/// Name of the placeholder file that keeps an otherwise empty folder.
pub const FOLDER_PLACEHOLDER: &str = ".gitkeep";

const PLACEHOLDER_CONTENT: &str = "# This file exists to create the folder structure\n";

fn commit<S: ObjectStore>(
    engine: &Engine<S>,
    branch: &str,
    edits: &[Edit],
    fallback: String,
    message: Option<&str>,
) -> Result<BatchOutcome> {
    let message = paths::format_commit_message(&fallback, message);
    engine.apply_batch(branch, edits, &message)
}

/// Fail unless `path` is a file on `branch`.
fn require_file<S: ObjectStore>(engine: &Engine<S>, branch: &str, path: &str) -> Result<()> {
    match engine.file_type(branch, path)? {
        Some(kind) if kind.is_leaf() => Ok(()),
        Some(_) => Err(Error::is_a_directory(path)),
        None => Err(Error::not_found(path)),
    }
}

/// Create or overwrite one file.
pub fn write_file<S: ObjectStore>(
    engine: &Engine<S>,
    branch: &str,
    path: &str,
    content: impl Into<Vec<u8>>,
    message: Option<&str>,
) -> Result<BatchOutcome> {
    let path = paths::normalize_file_path(path)?;
    let fallback = format!("Update {}", path);
    commit(engine, branch, &[Edit::write(path, content)], fallback, message)
}

/// Create or overwrite several files in one commit.
pub fn write_files<S, P, C>(
    engine: &Engine<S>,
    branch: &str,
    files: impl IntoIterator<Item = (P, C)>,
    message: Option<&str>,
) -> Result<BatchOutcome>
where
    S: ObjectStore,
    P: Into<String>,
    C: Into<Vec<u8>>,
{
    let edits: Vec<Edit> = files
        .into_iter()
        .map(|(path, content)| Edit::write(path, content))
        .collect();
    let fallback = format!("Update {} files", edits.len());
    commit(engine, branch, &edits, fallback, message)
}

/// Replace the single occurrence of `old` in a file with `new`.
pub fn edit_file<S: ObjectStore>(
    engine: &Engine<S>,
    branch: &str,
    path: &str,
    old: &str,
    new: &str,
    message: Option<&str>,
) -> Result<BatchOutcome> {
    let path = paths::normalize_file_path(path)?;
    let fallback = format!("Edit {}", path);
    commit(engine, branch, &[Edit::replace(path, old, new)], fallback, message)
}

/// Delete one file. Directories are refused.
pub fn delete_file<S: ObjectStore>(
    engine: &Engine<S>,
    branch: &str,
    path: &str,
    message: Option<&str>,
) -> Result<BatchOutcome> {
    let path = paths::normalize_file_path(path)?;
    require_file(engine, branch, &path)?;
    let fallback = format!("Delete {}", path);
    commit(engine, branch, &[Edit::delete(path)], fallback, message)
}

/// Delete several files in one commit. Directories are refused.
pub fn delete_files<S, P>(
    engine: &Engine<S>,
    branch: &str,
    files: impl IntoIterator<Item = P>,
    message: Option<&str>,
) -> Result<BatchOutcome>
where
    S: ObjectStore,
    P: AsRef<str>,
{
    let mut edits = Vec::new();
    for path in files {
        let path = paths::normalize_file_path(path.as_ref())?;
        require_file(engine, branch, &path)?;
        edits.push(Edit::delete(path));
    }
    let fallback = format!("Delete {} files", edits.len());
    commit(engine, branch, &edits, fallback, message)
}

/// Create a folder by adding a placeholder file to it.
///
/// # Errors
/// Returns [`Error::DestinationExists`] if the placeholder is already there.
pub fn create_folder<S: ObjectStore>(
    engine: &Engine<S>,
    branch: &str,
    dir: &str,
    message: Option<&str>,
) -> Result<BatchOutcome> {
    let dir = paths::normalize_file_path(dir)?;
    let placeholder = paths::join(&dir, FOLDER_PLACEHOLDER);
    if engine.file_type(branch, &placeholder)?.is_some() {
        return Err(Error::destination_exists(placeholder));
    }
    let fallback = format!("Create folder {}/", dir);
    let edits = [Edit::write(placeholder, PLACEHOLDER_CONTENT)];
    commit(engine, branch, &edits, fallback, message)
}

/// Delete a folder and everything beneath it. Files are refused.
pub fn delete_folder<S: ObjectStore>(
    engine: &Engine<S>,
    branch: &str,
    dir: &str,
    message: Option<&str>,
) -> Result<BatchOutcome> {
    let dir = paths::normalize_file_path(dir)?;
    match engine.file_type(branch, &dir)? {
        Some(kind) if kind.is_leaf() => return Err(Error::not_a_directory(dir)),
        Some(_) => {}
        None => return Err(Error::not_found(dir)),
    }
    let fallback = format!("Delete folder {}/ and all its contents", dir);
    commit(engine, branch, &[Edit::delete(dir)], fallback, message)
}

/// Move one file (or a whole folder) to a new path.
pub fn move_file<S: ObjectStore>(
    engine: &Engine<S>,
    branch: &str,
    from: &str,
    to: &str,
    message: Option<&str>,
) -> Result<BatchOutcome> {
    let from = paths::normalize_file_path(from)?;
    let to = paths::normalize_file_path(to)?;
    let fallback = format!("Move {} to {}", from, to);
    commit(engine, branch, &[Edit::move_to(from, to)], fallback, message)
}

/// Move several files in one commit.
pub fn move_files<S, P, Q>(
    engine: &Engine<S>,
    branch: &str,
    moves: impl IntoIterator<Item = (P, Q)>,
    message: Option<&str>,
) -> Result<BatchOutcome>
where
    S: ObjectStore,
    P: AsRef<str>,
    Q: AsRef<str>,
{
    let mut pairs = Vec::new();
    for (from, to) in moves {
        pairs.push((
            paths::normalize_file_path(from.as_ref())?,
            paths::normalize_file_path(to.as_ref())?,
        ));
    }
    let edits: Vec<Edit> = pairs
        .iter()
        .map(|(from, to)| Edit::move_to(from.as_str(), to.as_str()))
        .collect();
    let fallback = paths::summarize_moves(&pairs);
    commit(engine, branch, &edits, fallback, message)
}

/// Rename a file in place, keeping its directory.
///
/// # Errors
/// Returns [`Error::InvalidEdit`] if `new_name` contains `/` or equals the
/// current name.
pub fn rename_file<S: ObjectStore>(
    engine: &Engine<S>,
    branch: &str,
    path: &str,
    new_name: &str,
    message: Option<&str>,
) -> Result<BatchOutcome> {
    let path = paths::normalize_file_path(path)?;
    if new_name.is_empty() || new_name.contains('/') || new_name == "." || new_name == ".." {
        return Err(Error::invalid_edit(format!(
            "new name must be a single path segment: {:?}",
            new_name
        )));
    }
    let current = paths::basename(&path);
    if current == new_name {
        return Err(Error::invalid_edit(format!(
            "new name is the same as the current name: {}",
            new_name
        )));
    }
    let fallback = format!("Rename {} to {}", current, new_name);
    let target = paths::join(paths::parent_dir(&path), new_name);
    commit(engine, branch, &[Edit::move_to(path.as_str(), target)], fallback, message)
}

/// Apply an arbitrary list of edits as one commit.
pub fn batch<S: ObjectStore>(
    engine: &Engine<S>,
    branch: &str,
    edits: &[Edit],
    message: Option<&str>,
) -> Result<BatchOutcome> {
    let fallback = format!("Apply {} operations", edits.len());
    commit(engine, branch, edits, fallback, message)
}
