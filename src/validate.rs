//! Batch checking.
//!
//! A batch is normalized, expanded against the snapshot (directory deletes
//! and moves become per-file edits), then checked as a whole. Nothing here
//! touches the store: file bodies needed for `Replace` are fetched by the
//! caller beforehand and passed in.
//!
//! The result of a successful check is a [`Plan`]: the set of snapshot
//! paths that no longer survive as-is, and the final content of every path
//! the batch defines.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::paths;
use crate::snapshot::Snapshot;
use crate::types::{Edit, FileRef, MODE_BLOB, MODE_BLOB_EXEC, MODE_LINK};

/// Final content of one path defined by the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pending {
    /// New bytes that still have to be written.
    Content { data: Vec<u8>, mode: u32 },
    /// An object that already exists (the source of a move).
    Existing(FileRef),
}

/// The checked change set of one batch.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Snapshot paths that are deleted, vacated by a move, or superseded.
    pub excluded: BTreeSet<String>,
    /// Final content of each path the batch writes, keyed by path.
    pub added: BTreeMap<String, Pending>,
}

/// Normalize every path in the batch.
///
/// # Errors
/// Returns [`Error::InvalidPath`] for root or `..` paths, and
/// [`Error::InvalidEdit`] for unsupported write modes or an empty `find`.
pub fn normalize_edits(edits: &[Edit]) -> Result<Vec<Edit>> {
    edits
        .iter()
        .map(|edit| {
            Ok(match edit {
                Edit::Write { path, content, mode } => {
                    if !matches!(*mode, MODE_BLOB | MODE_BLOB_EXEC | MODE_LINK) {
                        return Err(Error::invalid_edit(format!(
                            "unsupported mode {:#o} for {}",
                            mode, path
                        )));
                    }
                    Edit::Write {
                        path: paths::normalize_file_path(path)?,
                        content: content.clone(),
                        mode: *mode,
                    }
                }
                Edit::Replace {
                    path,
                    find,
                    replacement,
                } => {
                    if find.is_empty() {
                        return Err(Error::invalid_edit(format!(
                            "text to replace in {} must not be empty",
                            path
                        )));
                    }
                    Edit::Replace {
                        path: paths::normalize_file_path(path)?,
                        find: find.clone(),
                        replacement: replacement.clone(),
                    }
                }
                Edit::Delete { path } => Edit::Delete {
                    path: paths::normalize_file_path(path)?,
                },
                Edit::Move { from, to } => Edit::Move {
                    from: paths::normalize_file_path(from)?,
                    to: paths::normalize_file_path(to)?,
                },
            })
        })
        .collect()
}

/// Expand directory deletes and moves into per-file edits.
///
/// # Errors
/// Returns [`Error::NotFound`] for a `Delete` of a path that is neither a
/// file nor a directory in the snapshot.
pub fn expand(snapshot: &Snapshot, edits: Vec<Edit>) -> Result<Vec<Edit>> {
    let mut out = Vec::with_capacity(edits.len());
    for edit in edits {
        match edit {
            Edit::Delete { path } if !snapshot.contains(&path) => {
                if !snapshot.is_dir(&path) {
                    return Err(Error::not_found(path));
                }
                for (rel, _) in snapshot.files_under(&path) {
                    out.push(Edit::delete(paths::join(&path, &rel)));
                }
            }
            Edit::Move { from, to } if !snapshot.contains(&from) && snapshot.is_dir(&from) => {
                for (rel, _) in snapshot.files_under(&from) {
                    out.push(Edit::move_to(paths::join(&from, &rel), paths::join(&to, &rel)));
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Paths whose current bodies `validate` needs: every `Replace` target
/// that exists in the snapshot.
pub fn bodies_needed(snapshot: &Snapshot, edits: &[Edit]) -> BTreeMap<String, FileRef> {
    edits
        .iter()
        .filter_map(|edit| match edit {
            Edit::Replace { path, .. } => snapshot.get(path).map(|f| (path.clone(), *f)),
            _ => None,
        })
        .collect()
}

/// Check a normalized, expanded batch against `snapshot`.
///
/// `bodies` holds the current content of every `Replace` target.
///
/// # Errors
/// - [`Error::DuplicateDestination`] when two edits define the same path
///   (`Write`/`Write`, `Write`/`Move`, `Move`/`Move`, `Move`/`Replace`).
/// - [`Error::DuplicateSource`] when a path is vacated twice, or replaced
///   and vacated.
/// - [`Error::SourceNotFound`] when a `Move` source or `Replace` target is
///   not a file in the snapshot.
/// - [`Error::DestinationExists`] when a `Move` lands on an existing file the
///   batch does not vacate, or on its own source.
/// - [`Error::TextNotFound`] / [`Error::AmbiguousMatch`] when a `Replace`
///   matches zero or several times.
/// - [`Error::NotADirectory`] / [`Error::IsADirectory`] when the final tree
///   would need the same path as both a file and a directory.
pub fn validate(
    snapshot: &Snapshot,
    edits: &[Edit],
    bodies: &BTreeMap<String, Vec<u8>>,
) -> Result<Plan> {
    let mut destinations: BTreeSet<&str> = BTreeSet::new();
    let mut move_sources: BTreeSet<&str> = BTreeSet::new();
    let mut move_targets: BTreeSet<&str> = BTreeSet::new();
    let mut deleted: BTreeSet<&str> = BTreeSet::new();
    let mut replaced: BTreeSet<&str> = BTreeSet::new();

    for edit in edits {
        match edit {
            Edit::Write { path, .. } => {
                if !destinations.insert(path) {
                    return Err(Error::duplicate_destination(path.as_str()));
                }
            }
            Edit::Move { from, to } => {
                if move_sources.contains(from.as_str()) || deleted.contains(from.as_str()) {
                    return Err(Error::duplicate_source(from.as_str()));
                }
                move_sources.insert(from);
                if !destinations.insert(to) {
                    return Err(Error::duplicate_destination(to.as_str()));
                }
                move_targets.insert(to);
            }
            Edit::Delete { path } => {
                if move_sources.contains(path.as_str()) {
                    return Err(Error::duplicate_source(path.as_str()));
                }
                deleted.insert(path);
            }
            Edit::Replace { path, .. } => {
                replaced.insert(path);
            }
        }
    }

    for path in &replaced {
        if move_targets.contains(path) {
            return Err(Error::duplicate_destination(*path));
        }
        if move_sources.contains(path) || deleted.contains(path) {
            return Err(Error::duplicate_source(*path));
        }
        if !snapshot.contains(path) {
            return Err(Error::source_not_found(*path));
        }
    }

    for edit in edits {
        if let Edit::Move { from, to } = edit {
            if !snapshot.contains(from) {
                return Err(Error::source_not_found(from.as_str()));
            }
            if from == to {
                return Err(Error::destination_exists(to.as_str()));
            }
            let vacated = move_sources.contains(to.as_str()) || deleted.contains(to.as_str());
            if snapshot.contains(to) && !vacated {
                return Err(Error::destination_exists(to.as_str()));
            }
        }
    }

    // Resolve final content in batch order; chained replaces see the
    // output of earlier edits to the same path.
    let mut added: BTreeMap<String, Pending> = BTreeMap::new();
    for edit in edits {
        match edit {
            Edit::Write { path, content, mode } => {
                added.insert(
                    path.clone(),
                    Pending::Content {
                        data: content.clone(),
                        mode: *mode,
                    },
                );
            }
            Edit::Replace {
                path,
                find,
                replacement,
            } => {
                let (current, mode) = match added.get(path) {
                    Some(Pending::Content { data, mode }) => (data.as_slice(), *mode),
                    _ => {
                        let file = snapshot
                            .get(path)
                            .ok_or_else(|| Error::source_not_found(path.as_str()))?;
                        let body = bodies
                            .get(path)
                            .ok_or_else(|| Error::source_not_found(path.as_str()))?;
                        (body.as_slice(), file.mode)
                    }
                };
                let data = replace_unique(path, current, find.as_bytes(), replacement.as_bytes())?;
                added.insert(path.clone(), Pending::Content { data, mode });
            }
            Edit::Move { from, to } => {
                let file = snapshot
                    .get(from)
                    .ok_or_else(|| Error::source_not_found(from.as_str()))?;
                added.insert(to.clone(), Pending::Existing(*file));
            }
            Edit::Delete { .. } => {}
        }
    }

    let excluded: BTreeSet<String> = deleted
        .iter()
        .chain(move_sources.iter())
        .chain(replaced.iter())
        .map(|p| p.to_string())
        .collect();

    check_file_dir_clashes(snapshot, &excluded, &added)?;

    Ok(Plan { excluded, added })
}

/// Every added path must be placeable: none of its ancestors may be a
/// surviving file, and no surviving file may live beneath it.
fn check_file_dir_clashes(
    snapshot: &Snapshot,
    excluded: &BTreeSet<String>,
    added: &BTreeMap<String, Pending>,
) -> Result<()> {
    let mut survivors: BTreeSet<&str> = snapshot
        .paths()
        .filter(|p| !excluded.contains(*p))
        .collect();
    survivors.extend(added.keys().map(String::as_str));

    for path in added.keys() {
        for ancestor in paths::ancestors(path) {
            if survivors.contains(ancestor) {
                return Err(Error::not_a_directory(ancestor));
            }
        }
        let prefix = format!("{}/", path);
        let blocked = survivors
            .range(prefix.as_str()..)
            .next()
            .map_or(false, |p| p.starts_with(&prefix));
        if blocked {
            return Err(Error::is_a_directory(path.as_str()));
        }
    }
    Ok(())
}

/// Replace the single occurrence of `find` in `haystack`.
fn replace_unique(path: &str, haystack: &[u8], find: &[u8], replacement: &[u8]) -> Result<Vec<u8>> {
    match count_occurrences(haystack, find) {
        0 => Err(Error::text_not_found(path)),
        1 => {
            let at = haystack
                .windows(find.len())
                .position(|w| w == find)
                .ok_or_else(|| Error::text_not_found(path))?;
            let mut out = Vec::with_capacity(haystack.len() - find.len() + replacement.len());
            out.extend_from_slice(&haystack[..at]);
            out.extend_from_slice(replacement);
            out.extend_from_slice(&haystack[at + find.len()..]);
            Ok(out)
        }
        n => Err(Error::ambiguous_match(path, n)),
    }
}

/// Count non-overlapping occurrences of `needle`, scanning left to right.
pub fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            count += 1;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_non_overlapping() {
        assert_eq!(count_occurrences(b"foo bar foo", b"foo"), 2);
        assert_eq!(count_occurrences(b"aaaa", b"aa"), 2);
        assert_eq!(count_occurrences(b"abc", b"x"), 0);
        assert_eq!(count_occurrences(b"ab", b"abc"), 0);
        assert_eq!(count_occurrences(b"abc", b""), 0);
    }

    #[test]
    fn replace_unique_splices() {
        let out = replace_unique("f", b"let x = 1;", b"1", b"42").unwrap();
        assert_eq!(out, b"let x = 42;");
    }

    #[test]
    fn replace_unique_rejects_repeats() {
        let err = replace_unique("f", b"foo foo", b"foo", b"bar").unwrap_err();
        assert!(matches!(err, Error::AmbiguousMatch { occurrences: 2, .. }));
    }

    #[test]
    fn replace_unique_rejects_missing() {
        let err = replace_unique("f", b"foo", b"baz", b"bar").unwrap_err();
        assert!(matches!(err, Error::TextNotFound { .. }));
    }

    #[test]
    fn normalize_rejects_empty_find() {
        let err = normalize_edits(&[Edit::replace("a.txt", "", "x")]).unwrap_err();
        assert!(matches!(err, Error::InvalidEdit(_)));
    }

    #[test]
    fn normalize_rejects_tree_mode() {
        let err = normalize_edits(&[Edit::write_with_mode("a", "x", 0o040000)]).unwrap_err();
        assert!(matches!(err, Error::InvalidEdit(_)));
    }

    fn snapshot_of(paths: &[&str]) -> Snapshot {
        use crate::memory::MemoryStore;
        use crate::snapshot::read_snapshot;
        use crate::store::ObjectStore;

        let store = MemoryStore::with_branch("main").unwrap();
        let blob = store.write_blob(b"x").unwrap();
        let mut added = BTreeMap::new();
        for path in paths {
            added.insert(path.to_string(), FileRef::new(blob, MODE_BLOB));
        }
        let snap = read_snapshot(&store, "main").unwrap();
        let node = crate::tree::synthesize(&snap, &BTreeSet::new(), &added).unwrap();
        let tree = crate::tree::write_tree_node(&store, &node).unwrap();
        let tip = store.branch_tip("main").unwrap();
        let commit = store.write_commit(tree, &[tip.commit], "seed").unwrap();
        store.force_branch("main", commit);
        read_snapshot(&store, "main").unwrap()
    }

    #[test]
    fn move_onto_itself_is_rejected() {
        let snap = snapshot_of(&["a.txt", "dir/b.txt"]);
        let err = validate(&snap, &[Edit::move_to("a.txt", "a.txt")], &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::DestinationExists(ref p) if p == "a.txt"));

        let edits = expand(&snap, vec![Edit::move_to("dir", "dir")]).unwrap();
        let err = validate(&snap, &edits, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::DestinationExists(ref p) if p == "dir/b.txt"));
    }

    #[test]
    fn swap_through_vacated_paths_is_allowed() {
        let snap = snapshot_of(&["a.txt", "b.txt"]);
        let plan = validate(
            &snap,
            &[Edit::move_to("a.txt", "b.txt"), Edit::move_to("b.txt", "a.txt")],
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(plan.excluded.len(), 2);
        assert_eq!(plan.added.len(), 2);
    }

    #[test]
    fn normalize_cleans_paths() {
        let edits = normalize_edits(&[Edit::move_to("/src//a.py", "./src/b.py")]).unwrap();
        assert_eq!(edits, vec![Edit::move_to("src/a.py", "src/b.py")]);
    }
}
