use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::paths::branch_ref;
use crate::types::{BranchTip, CommitInfo, ObjectId, OpenOptions, Signature, TreeItem};

/// The versioned object store a batch is committed against.
///
/// Content objects, trees and commits are immutable and content-addressed;
/// the only mutable state is one pointer per branch, changed exclusively
/// through [`compare_and_set_branch`](ObjectStore::compare_and_set_branch).
pub trait ObjectStore {
    /// Resolve a branch to its tip commit and root tree.
    ///
    /// Fails with [`Error::NotFound`] if the branch does not exist.
    fn branch_tip(&self, branch: &str) -> Result<BranchTip>;

    /// List the immediate children of a tree.
    ///
    /// Fails with [`Error::NotFound`] if the tree object is missing, and
    /// with [`Error::InvalidPath`] if an entry name cannot be represented
    /// exactly.
    fn list_tree(&self, tree: ObjectId) -> Result<Vec<TreeItem>>;

    fn read_blob(&self, oid: ObjectId) -> Result<Vec<u8>>;

    fn read_commit(&self, commit: ObjectId) -> Result<CommitInfo>;

    /// Store `data` as a content object. Writing the same bytes again
    /// returns the same id and is never an error.
    fn write_blob(&self, data: &[u8]) -> Result<ObjectId>;

    fn write_tree(&self, items: &[TreeItem]) -> Result<ObjectId>;

    fn write_commit(&self, tree: ObjectId, parents: &[ObjectId], message: &str) -> Result<ObjectId>;

    /// Point `branch` at `new` if and only if it currently points at
    /// `expected`; otherwise fail with [`Error::RefConflict`]. Losing a race
    /// for the ref itself is also a `RefConflict`.
    fn compare_and_set_branch(&self, branch: &str, expected: ObjectId, new: ObjectId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// GitStore
// ---------------------------------------------------------------------------

/// Internal state shared via `Arc`.
pub(crate) struct GitStoreInner {
    pub(crate) repo: Mutex<git2::Repository>,
    pub(crate) path: PathBuf,
    pub(crate) signature: Signature,
}

/// An [`ObjectStore`] backed by a bare git repository on disk.
///
/// Cheap to clone (`Arc` internally).
#[derive(Clone)]
pub struct GitStore {
    pub(crate) inner: Arc<GitStoreInner>,
}

impl std::fmt::Debug for GitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl GitStore {
    /// Open (or create) a bare git repository at `path`.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let sig = Signature {
            name: options.author.unwrap_or_else(|| Signature::default().name),
            email: options.email.unwrap_or_else(|| Signature::default().email),
        };

        let repo = if path.exists() {
            git2::Repository::open_bare(&path).map_err(Error::git)?
        } else if options.create {
            std::fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
            let repo = git2::Repository::init_bare(&path).map_err(Error::git)?;

            if let Some(ref branch) = options.branch {
                crate::paths::validate_branch_name(branch)?;
                Self::init_branch(&repo, branch, &sig)?;
            }

            repo
        } else {
            return Err(Error::not_found(format!(
                "repository not found: {}",
                path.display()
            )));
        };

        Ok(GitStore {
            inner: Arc::new(GitStoreInner {
                repo: Mutex::new(repo),
                path,
                signature: sig,
            }),
        })
    }

    /// Create the initial commit on `branch` with an empty tree and point
    /// `HEAD` at it.
    fn init_branch(repo: &git2::Repository, branch: &str, sig: &Signature) -> Result<()> {
        let tree_oid = repo
            .treebuilder(None)
            .and_then(|builder| builder.write())
            .map_err(Error::git)?;
        let tree = repo.find_tree(tree_oid).map_err(Error::git)?;
        let actor = git2::Signature::now(&sig.name, &sig.email).map_err(Error::git)?;

        let refname = branch_ref(branch);
        repo.commit(
            Some(&refname),
            &actor,
            &actor,
            &format!("Initialize {}", branch),
            &tree,
            &[],
        )
        .map_err(Error::git)?;
        repo.set_head(&refname).map_err(Error::git)?;

        log::debug!("initialized branch '{}'", branch);
        Ok(())
    }

    /// Helper: lock the repo mutex and call `f` with the repository.
    fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&git2::Repository) -> Result<T>,
    {
        let repo = self
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;
        f(&repo)
    }

    /// Path to the bare repository on disk.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The signature used for commits.
    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    /// Names of all local branches, sorted.
    pub fn branches(&self) -> Result<Vec<String>> {
        self.with_repo(|repo| {
            let mut names = Vec::new();
            for branch in repo
                .branches(Some(git2::BranchType::Local))
                .map_err(Error::git)?
            {
                let (branch, _) = branch.map_err(Error::git)?;
                if let Some(name) = branch.name().map_err(Error::git)? {
                    names.push(name.to_string());
                }
            }
            names.sort();
            Ok(names)
        })
    }
}

impl ObjectStore for GitStore {
    fn branch_tip(&self, branch: &str) -> Result<BranchTip> {
        self.with_repo(|repo| {
            let refname = branch_ref(branch);
            let reference = repo
                .find_reference(&refname)
                .map_err(|e| Error::from_git2(e, &format!("branch '{}'", branch)))?;
            let commit = reference.peel_to_commit().map_err(Error::git)?;
            Ok(BranchTip {
                commit: commit.id(),
                tree: commit.tree_id(),
            })
        })
    }

    fn list_tree(&self, tree: ObjectId) -> Result<Vec<TreeItem>> {
        self.with_repo(|repo| {
            let found = repo
                .find_tree(tree)
                .map_err(|e| Error::from_git2(e, &format!("tree {}", tree)))?;
            let mut items = Vec::with_capacity(found.len());
            for entry in found.iter() {
                // Names must round-trip byte for byte.
                let name = entry.name().ok_or_else(|| {
                    Error::invalid_path(format!(
                        "non-UTF-8 entry name {:?} in tree {}",
                        String::from_utf8_lossy(entry.name_bytes()),
                        tree
                    ))
                })?;
                items.push(TreeItem::new(name, entry.id(), entry.filemode() as u32));
            }
            Ok(items)
        })
    }

    fn read_blob(&self, oid: ObjectId) -> Result<Vec<u8>> {
        self.with_repo(|repo| {
            let blob = repo
                .find_blob(oid)
                .map_err(|e| Error::from_git2(e, &format!("blob {}", oid)))?;
            Ok(blob.content().to_vec())
        })
    }

    fn read_commit(&self, commit: ObjectId) -> Result<CommitInfo> {
        self.with_repo(|repo| {
            let commit = repo
                .find_commit(commit)
                .map_err(|e| Error::from_git2(e, &format!("commit {}", commit)))?;
            Ok(CommitInfo {
                tree: commit.tree_id(),
                parents: commit.parent_ids().collect(),
                message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            })
        })
    }

    fn write_blob(&self, data: &[u8]) -> Result<ObjectId> {
        self.with_repo(|repo| repo.blob(data).map_err(Error::git))
    }

    fn write_tree(&self, items: &[TreeItem]) -> Result<ObjectId> {
        self.with_repo(|repo| {
            let mut builder = repo.treebuilder(None).map_err(Error::git)?;
            for item in items {
                builder
                    .insert(&item.name, item.oid, item.mode as i32)
                    .map_err(Error::git)?;
            }
            builder.write().map_err(Error::git)
        })
    }

    fn write_commit(&self, tree: ObjectId, parents: &[ObjectId], message: &str) -> Result<ObjectId> {
        self.with_repo(|repo| {
            let tree = repo
                .find_tree(tree)
                .map_err(|e| Error::from_git2(e, &format!("tree {}", tree)))?;
            let parents = parents
                .iter()
                .map(|oid| {
                    repo.find_commit(*oid)
                        .map_err(|e| Error::from_git2(e, &format!("commit {}", oid)))
                })
                .collect::<Result<Vec<_>>>()?;
            let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
            let actor = git2::Signature::now(&self.inner.signature.name, &self.inner.signature.email)
                .map_err(Error::git)?;
            repo.commit(None, &actor, &actor, message, &tree, &parent_refs)
                .map_err(Error::git)
        })
    }

    fn compare_and_set_branch(&self, branch: &str, expected: ObjectId, new: ObjectId) -> Result<()> {
        self.with_repo(|repo| {
            let refname = branch_ref(branch);
            let log_message = format!("commit: {}", new);
            match repo.reference_matching(&refname, new, true, expected, &log_message) {
                Ok(_) => Ok(()),
                Err(err) => match repo.refname_to_id(&refname) {
                    Ok(actual) if actual != expected => {
                        Err(Error::ref_conflict(branch, expected, actual))
                    }
                    Err(e) if e.code() == git2::ErrorCode::NotFound => {
                        Err(Error::not_found(format!("branch '{}'", branch)))
                    }
                    // Another handle holds the ref lock or updated it mid-write.
                    _ => match err.code() {
                        git2::ErrorCode::Locked => {
                            Err(Error::ref_conflict(branch, expected, "a locked ref"))
                        }
                        git2::ErrorCode::Modified => {
                            Err(Error::ref_conflict(branch, expected, "a concurrent update"))
                        }
                        _ => Err(Error::git(err)),
                    },
                },
            }
        })
    }
}
