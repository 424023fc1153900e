use std::collections::BTreeMap;

use crate::engine::Deadline;
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use crate::types::{BranchTip, FileRef, FileType, ObjectId, Stage, TreeItem, MODE_TREE};

/// Every file reachable from a branch tip at the moment it was read.
///
/// Directories are structural and are not stored; only leaf entries
/// (regular files, executables, symlinks, submodule links) are kept, keyed by
/// their full slash-separated path. Read fresh for each batch.
#[derive(Debug, Clone)]
pub struct Snapshot {
    branch: String,
    tip: BranchTip,
    files: BTreeMap<String, FileRef>,
}

impl Snapshot {
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The tip commit and root tree the snapshot was read from.
    pub fn tip(&self) -> BranchTip {
        self.tip
    }

    pub fn get(&self, path: &str) -> Option<&FileRef> {
        self.files.get(path)
    }

    /// Whether `path` is a file in the snapshot.
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Whether `path` is a directory, i.e. some file lives beneath it.
    pub fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = format!("{}/", path);
        self.files
            .range(prefix.clone()..)
            .next()
            .map_or(false, |(p, _)| p.starts_with(&prefix))
    }

    /// Files beneath directory `dir`, with paths relative to it.
    pub fn files_under(&self, dir: &str) -> Vec<(String, FileRef)> {
        if dir.is_empty() {
            return self.files.iter().map(|(p, f)| (p.clone(), *f)).collect();
        }
        let prefix = format!("{}/", dir);
        self.files
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .map(|(p, f)| (p[prefix.len()..].to_string(), *f))
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileRef)> {
        self.files.iter().map(|(p, f)| (p.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Read the full file listing of `branch`.
///
/// A subtree that has vanished by the time it is listed is treated as
/// empty; the final compare-and-set catches any resulting inconsistency.
/// Every other failure, including timeouts, is returned as-is.
///
/// # Errors
/// Returns [`Error::NotFound`] if the branch or its root tree does not exist.
pub fn read_snapshot<S: ObjectStore>(store: &S, branch: &str) -> Result<Snapshot> {
    read_snapshot_until(store, branch, &Deadline::none())
}

pub(crate) fn read_snapshot_until<S: ObjectStore>(
    store: &S,
    branch: &str,
    deadline: &Deadline,
) -> Result<Snapshot> {
    let tip = store.branch_tip(branch)?;
    let root = store.list_tree(tip.tree)?;

    let mut files = BTreeMap::new();
    walk(store, root, "", deadline, &mut files)?;

    log::debug!(
        "read {} files from '{}' at {}",
        files.len(),
        branch,
        tip.commit
    );
    Ok(Snapshot {
        branch: branch.to_string(),
        tip,
        files,
    })
}

fn walk<S: ObjectStore>(
    store: &S,
    items: Vec<TreeItem>,
    prefix: &str,
    deadline: &Deadline,
    files: &mut BTreeMap<String, FileRef>,
) -> Result<()> {
    deadline.check(Stage::Reading)?;

    for item in items {
        let full_path = crate::paths::join(prefix, &item.name);

        if item.mode == MODE_TREE {
            match store.list_tree(item.oid) {
                Ok(children) => walk(store, children, &full_path, deadline, files)?,
                Err(Error::NotFound(_)) => {
                    log::warn!("subtree {} ({}) vanished during read", full_path, item.oid);
                }
                Err(e) => return Err(e),
            }
        } else {
            files.insert(full_path, FileRef::new(item.oid, item.mode));
        }
    }
    Ok(())
}

/// Return the entry at `path` below `tree`, or `None` if missing.
///
/// Walks one path segment at a time. Returns `None` when any segment is
/// not found or an intermediate entry is not a tree.
pub fn entry_at_path<S: ObjectStore>(
    store: &S,
    tree: ObjectId,
    path: &str,
) -> Result<Option<TreeItem>> {
    let path = crate::paths::normalize_path(path)?;
    if path.is_empty() {
        return Ok(Some(TreeItem::new("", tree, MODE_TREE)));
    }

    let segments: Vec<&str> = path.split('/').collect();
    let mut current = tree;

    for (i, segment) in segments.iter().enumerate() {
        let items = store.list_tree(current)?;
        let Some(found) = items.into_iter().find(|e| e.name == *segment) else {
            return Ok(None);
        };

        if i == segments.len() - 1 {
            return Ok(Some(found));
        }
        if found.mode != MODE_TREE {
            return Ok(None);
        }
        current = found.oid;
    }

    Ok(None)
}

/// Type of whatever lives at `path` on `branch`, or `None` if nothing does.
pub fn file_type_at<S: ObjectStore>(store: &S, branch: &str, path: &str) -> Result<Option<FileType>> {
    let tip = store.branch_tip(branch)?;
    Ok(entry_at_path(store, tip.tree, path)?.and_then(|e| e.file_type()))
}

/// Read the current body of the file at `path` on `branch`.
///
/// # Errors
/// Returns [`Error::IsADirectory`] if the path is a directory,
/// [`Error::NotFound`] if it does not exist.
pub fn read_file<S: ObjectStore>(store: &S, branch: &str, path: &str) -> Result<Vec<u8>> {
    let tip = store.branch_tip(branch)?;
    let entry = entry_at_path(store, tip.tree, path)?.ok_or_else(|| Error::not_found(path))?;
    if entry.mode == MODE_TREE {
        return Err(Error::is_a_directory(path));
    }
    store.read_blob(entry.oid)
}
