//! In-memory object store for deterministic testing.
//!
//! [`MemoryStore`] implements [`ObjectStore`] with git-compatible object ids,
//! records every call it receives, and can be told to fail a chosen
//! operation with a timeout, either before or after the operation takes
//! effect.
//!
//! ```
//! use gitbatch::memory::{MemoryStore, Operation};
//! use gitbatch::{Edit, Engine};
//!
//! let store = MemoryStore::with_branch("main").unwrap();
//! let engine = Engine::new(store.clone());
//! engine.apply_batch("main", &[Edit::write("a.txt", "hello")], "add a").unwrap();
//! assert!(store.operations().contains(&Operation::CompareAndSet));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use git2::ObjectType;

use crate::error::{Error, Result};
use crate::store::ObjectStore;
use crate::types::{BranchTip, CommitInfo, ObjectId, Stage, TreeItem};

/// Store calls, as recorded by [`MemoryStore::operations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    BranchTip,
    ListTree,
    ReadBlob,
    ReadCommit,
    WriteBlob,
    WriteTree,
    WriteCommit,
    CompareAndSet,
}

impl Operation {
    /// Whether the call creates objects or moves a branch.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteBlob | Self::WriteTree | Self::WriteCommit | Self::CompareAndSet
        )
    }

    fn stage(self) -> Stage {
        match self {
            Self::BranchTip | Self::ListTree => Stage::Reading,
            Self::ReadBlob | Self::ReadCommit => Stage::Validating,
            Self::WriteBlob => Stage::Writing,
            Self::WriteTree => Stage::Synthesizing,
            Self::WriteCommit | Self::CompareAndSet => Stage::Publishing,
        }
    }
}

/// A one-shot injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    /// Fail the next call to the operation without performing it.
    Timeout(Operation),
    /// Perform the next call to the operation, then report a timeout.
    TimeoutAfter(Operation),
}

#[derive(Debug, Clone)]
enum Object {
    Blob(Vec<u8>),
    Tree(Vec<TreeItem>),
    Commit(CommitInfo),
}

#[derive(Debug, Default)]
struct MemoryInner {
    objects: HashMap<ObjectId, Object>,
    branches: BTreeMap<String, ObjectId>,
    fail_on: Option<FailOn>,
    operations: Vec<Operation>,
}

/// In-memory [`ObjectStore`].
///
/// Thread-safe via internal `Arc<Mutex<...>>`; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding one branch whose tip is an empty-tree commit.
    pub fn with_branch(branch: &str) -> Result<Self> {
        let store = Self::new();
        {
            let mut inner = store.lock_raw();
            let tree = store_object(&mut inner, Object::Tree(Vec::new()))?;
            let commit = store_object(
                &mut inner,
                Object::Commit(CommitInfo {
                    tree,
                    parents: Vec::new(),
                    message: format!("Initialize {}", branch),
                }),
            )?;
            inner.branches.insert(branch.to_string(), commit);
        }
        Ok(store)
    }

    /// Arrange for the next matching call to fail.
    pub fn fail_on(&self, fail: FailOn) {
        self.lock_raw().fail_on = Some(fail);
    }

    /// Every call received so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock_raw().operations.clone()
    }

    /// Number of calls that created objects or moved a branch.
    pub fn write_count(&self) -> usize {
        self.lock_raw()
            .operations
            .iter()
            .filter(|op| op.is_write())
            .count()
    }

    pub fn clear_operations(&self) {
        self.lock_raw().operations.clear();
    }

    /// Drop an object, as if it vanished underneath a reader.
    pub fn remove_object(&self, oid: ObjectId) -> bool {
        self.lock_raw().objects.remove(&oid).is_some()
    }

    /// Move a branch unconditionally, the way an outside writer would.
    pub fn force_branch(&self, branch: &str, commit: ObjectId) {
        self.lock_raw().branches.insert(branch.to_string(), commit);
    }

    pub fn object_count(&self) -> usize {
        self.lock_raw().objects.len()
    }

    fn lock_raw(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `op`, apply any pending injected failure, and run `f`.
    fn call<T>(&self, op: Operation, f: impl FnOnce(&mut MemoryInner) -> Result<T>) -> Result<T> {
        let mut inner = self.lock_raw();
        inner.operations.push(op);
        let pending = inner.fail_on;
        match pending {
            Some(FailOn::Timeout(target)) if target == op => {
                inner.fail_on = None;
                Err(Error::timeout(op.stage()))
            }
            Some(FailOn::TimeoutAfter(target)) if target == op => {
                inner.fail_on = None;
                f(&mut *inner)?;
                Err(Error::timeout(op.stage()))
            }
            _ => f(&mut *inner),
        }
    }
}

fn hash(object: &Object) -> Result<ObjectId> {
    let (kind, bytes) = match object {
        Object::Blob(data) => (ObjectType::Blob, data.clone()),
        Object::Tree(items) => {
            let mut sorted: Vec<&TreeItem> = items.iter().collect();
            // git orders subtrees as if their names ended in '/'
            sorted.sort_by_key(|item| {
                let mut key = item.name.clone().into_bytes();
                if item.is_tree() {
                    key.push(b'/');
                }
                key
            });
            let mut buf = Vec::new();
            for item in sorted {
                buf.extend_from_slice(format!("{:o} {}\0", item.mode, item.name).as_bytes());
                buf.extend_from_slice(item.oid.as_bytes());
            }
            (ObjectType::Tree, buf)
        }
        Object::Commit(info) => {
            let mut text = format!("tree {}\n", info.tree);
            for parent in &info.parents {
                text.push_str(&format!("parent {}\n", parent));
            }
            text.push_str("author gitbatch <gitbatch@localhost> 0 +0000\n");
            text.push_str("committer gitbatch <gitbatch@localhost> 0 +0000\n\n");
            text.push_str(&info.message);
            (ObjectType::Commit, text.into_bytes())
        }
    };
    ObjectId::hash_object(kind, &bytes).map_err(Error::git)
}

fn store_object(inner: &mut MemoryInner, object: Object) -> Result<ObjectId> {
    let oid = hash(&object)?;
    inner.objects.entry(oid).or_insert(object);
    Ok(oid)
}

impl ObjectStore for MemoryStore {
    fn branch_tip(&self, branch: &str) -> Result<BranchTip> {
        self.call(Operation::BranchTip, |inner| {
            let commit = *inner
                .branches
                .get(branch)
                .ok_or_else(|| Error::not_found(format!("branch '{}'", branch)))?;
            match inner.objects.get(&commit) {
                Some(Object::Commit(info)) => Ok(BranchTip {
                    commit,
                    tree: info.tree,
                }),
                _ => Err(Error::not_found(format!("commit {}", commit))),
            }
        })
    }

    fn list_tree(&self, tree: ObjectId) -> Result<Vec<TreeItem>> {
        self.call(Operation::ListTree, |inner| match inner.objects.get(&tree) {
            Some(Object::Tree(items)) => Ok(items.clone()),
            _ => Err(Error::not_found(format!("tree {}", tree))),
        })
    }

    fn read_blob(&self, oid: ObjectId) -> Result<Vec<u8>> {
        self.call(Operation::ReadBlob, |inner| match inner.objects.get(&oid) {
            Some(Object::Blob(data)) => Ok(data.clone()),
            _ => Err(Error::not_found(format!("blob {}", oid))),
        })
    }

    fn read_commit(&self, commit: ObjectId) -> Result<CommitInfo> {
        self.call(Operation::ReadCommit, |inner| match inner.objects.get(&commit) {
            Some(Object::Commit(info)) => Ok(info.clone()),
            _ => Err(Error::not_found(format!("commit {}", commit))),
        })
    }

    fn write_blob(&self, data: &[u8]) -> Result<ObjectId> {
        self.call(Operation::WriteBlob, |inner| {
            store_object(inner, Object::Blob(data.to_vec()))
        })
    }

    fn write_tree(&self, items: &[TreeItem]) -> Result<ObjectId> {
        self.call(Operation::WriteTree, |inner| {
            for item in items {
                if !inner.objects.contains_key(&item.oid) {
                    return Err(Error::not_found(format!(
                        "object {} for tree entry {}",
                        item.oid, item.name
                    )));
                }
            }
            store_object(inner, Object::Tree(items.to_vec()))
        })
    }

    fn write_commit(&self, tree: ObjectId, parents: &[ObjectId], message: &str) -> Result<ObjectId> {
        self.call(Operation::WriteCommit, |inner| {
            if !matches!(inner.objects.get(&tree), Some(Object::Tree(_))) {
                return Err(Error::not_found(format!("tree {}", tree)));
            }
            store_object(
                inner,
                Object::Commit(CommitInfo {
                    tree,
                    parents: parents.to_vec(),
                    message: message.to_string(),
                }),
            )
        })
    }

    fn compare_and_set_branch(&self, branch: &str, expected: ObjectId, new: ObjectId) -> Result<()> {
        self.call(Operation::CompareAndSet, |inner| {
            let actual = *inner
                .branches
                .get(branch)
                .ok_or_else(|| Error::not_found(format!("branch '{}'", branch)))?;
            if actual != expected {
                return Err(Error::ref_conflict(branch, expected, actual));
            }
            inner.branches.insert(branch.to_string(), new);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_ids_match_git() {
        let store = MemoryStore::new();
        let oid = store.write_blob(b"hello\n").unwrap();
        // `printf 'hello\n' | git hash-object --stdin`
        assert_eq!(oid.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn identical_writes_share_an_id() {
        let store = MemoryStore::new();
        let a = store.write_blob(b"same").unwrap();
        let b = store.write_blob(b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.object_count(), 1);
    }

    #[test]
    fn timeout_is_one_shot() {
        let store = MemoryStore::new();
        store.fail_on(FailOn::Timeout(Operation::WriteBlob));
        assert!(matches!(
            store.write_blob(b"x"),
            Err(Error::Timeout { stage: Stage::Writing })
        ));
        assert_eq!(store.object_count(), 0);
        assert!(store.write_blob(b"x").is_ok());
    }

    #[test]
    fn timeout_after_still_applies() {
        let store = MemoryStore::new();
        store.fail_on(FailOn::TimeoutAfter(Operation::WriteBlob));
        assert!(store.write_blob(b"x").is_err());
        assert_eq!(store.object_count(), 1);
    }

    #[test]
    fn cas_rejects_stale_expectation() {
        let store = MemoryStore::with_branch("main").unwrap();
        let tip = store.branch_tip("main").unwrap();
        let commit = store.write_commit(tip.tree, &[tip.commit], "next").unwrap();
        store.compare_and_set_branch("main", tip.commit, commit).unwrap();

        let other = store.write_commit(tip.tree, &[tip.commit], "other").unwrap();
        let err = store
            .compare_and_set_branch("main", tip.commit, other)
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.branch_tip("main").unwrap().commit, commit);
    }

    #[test]
    fn missing_branch_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.branch_tip("nope"), Err(Error::NotFound(_))));
    }
}
