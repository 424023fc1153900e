use std::collections::{BTreeMap, BTreeSet};

use crate::engine::Deadline;
use crate::error::{Error, Result};
use crate::snapshot::Snapshot;
use crate::store::ObjectStore;
use crate::types::{FileRef, ObjectId, Stage, TreeItem, MODE_TREE};

/// One directory of a tree under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    pub files: BTreeMap<String, FileRef>,
    pub dirs: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    /// Place a file at a slash-separated `path`, creating intermediate
    /// directories.
    ///
    /// # Errors
    /// Returns [`Error::NotADirectory`] if an ancestor of `path` is a file,
    /// [`Error::IsADirectory`] if `path` itself is a directory.
    pub fn insert(&mut self, path: &str, file: FileRef) -> Result<()> {
        let mut node = self;
        let mut segments = path.split('/').peekable();
        let mut walked = String::new();

        while let Some(segment) = segments.next() {
            if !walked.is_empty() {
                walked.push('/');
            }
            walked.push_str(segment);

            if segments.peek().is_none() {
                if node.dirs.contains_key(segment) {
                    return Err(Error::is_a_directory(walked));
                }
                node.files.insert(segment.to_string(), file);
                return Ok(());
            }

            if node.files.contains_key(segment) {
                return Err(Error::not_a_directory(walked));
            }
            node = node.dirs.entry(segment.to_string()).or_default();
        }
        Ok(())
    }

    /// Nest a flat path map into a tree.
    pub fn from_files(files: &BTreeMap<String, FileRef>) -> Result<Self> {
        let mut root = Self::default();
        for (path, file) in files {
            root.insert(path, *file)?;
        }
        Ok(root)
    }
}

/// Final flat path set of a batch: the snapshot minus `excluded`, with
/// `added` laid over it.
pub fn merge(
    snapshot: &Snapshot,
    excluded: &BTreeSet<String>,
    added: &BTreeMap<String, FileRef>,
) -> BTreeMap<String, FileRef> {
    let mut files: BTreeMap<String, FileRef> = snapshot
        .iter()
        .filter(|(path, _)| !excluded.contains(*path))
        .map(|(path, file)| (path.to_string(), *file))
        .collect();
    for (path, file) in added {
        files.insert(path.clone(), *file);
    }
    files
}

/// Merge and nest in one step.
pub fn synthesize(
    snapshot: &Snapshot,
    excluded: &BTreeSet<String>,
    added: &BTreeMap<String, FileRef>,
) -> Result<TreeNode> {
    TreeNode::from_files(&merge(snapshot, excluded, added))
}

/// Write `node` and all of its subdirectories, children first, and return
/// the root tree id.
pub fn write_tree_node<S: ObjectStore>(store: &S, node: &TreeNode) -> Result<ObjectId> {
    write_tree_until(store, node, &Deadline::none())
}

pub(crate) fn write_tree_until<S: ObjectStore>(
    store: &S,
    node: &TreeNode,
    deadline: &Deadline,
) -> Result<ObjectId> {
    let mut items = Vec::with_capacity(node.files.len() + node.dirs.len());
    for (name, child) in &node.dirs {
        let oid = write_tree_until(store, child, deadline)?;
        items.push(TreeItem::new(name.as_str(), oid, MODE_TREE));
    }
    for (name, file) in &node.files {
        items.push(TreeItem::new(name.as_str(), file.oid, file.mode));
    }
    deadline.check(Stage::Synthesizing)?;
    store.write_tree(&items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MODE_BLOB;

    fn file(byte: u8) -> FileRef {
        FileRef::new(ObjectId::from_bytes(&[byte; 20]).unwrap(), MODE_BLOB)
    }

    #[test]
    fn nests_by_segment() {
        let mut files = BTreeMap::new();
        files.insert("README.md".to_string(), file(1));
        files.insert("src/a.py".to_string(), file(2));
        files.insert("src/lib/b.py".to_string(), file(3));

        let root = TreeNode::from_files(&files).unwrap();
        assert_eq!(root.files.len(), 1);
        let src = &root.dirs["src"];
        assert_eq!(src.files["a.py"], file(2));
        assert_eq!(src.dirs["lib"].files["b.py"], file(3));
    }

    #[test]
    fn file_under_file_is_rejected() {
        let mut root = TreeNode::default();
        root.insert("a", file(1)).unwrap();
        let err = root.insert("a/b", file(2)).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(p) if p == "a"));
    }

    #[test]
    fn file_over_directory_is_rejected() {
        let mut root = TreeNode::default();
        root.insert("a/b", file(1)).unwrap();
        let err = root.insert("a", file(2)).unwrap_err();
        assert!(matches!(err, Error::IsADirectory(p) if p == "a"));
    }

    #[test]
    fn written_tree_mirrors_nesting() {
        use crate::memory::MemoryStore;
        use crate::snapshot::read_snapshot;

        let store = MemoryStore::with_branch("main").unwrap();
        let blob = store.write_blob(b"a").unwrap();
        let mut added = BTreeMap::new();
        added.insert("src/a.py".to_string(), FileRef::new(blob, MODE_BLOB));

        let snap = read_snapshot(&store, "main").unwrap();
        let node = synthesize(&snap, &BTreeSet::new(), &added).unwrap();
        let root = write_tree_node(&store, &node).unwrap();

        let items = store.list_tree(root).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_tree());
        assert_eq!(
            store.list_tree(items[0].oid).unwrap(),
            vec![TreeItem::new("a.py", blob, MODE_BLOB)]
        );
    }

    #[test]
    fn insert_overwrites_file() {
        let mut root = TreeNode::default();
        root.insert("x/y", file(1)).unwrap();
        root.insert("x/y", file(2)).unwrap();
        assert_eq!(root.dirs["x"].files["y"], file(2));
    }
}
