//! The batch pipeline.
//!
//! One batch runs `Reading → Validating → Writing → Synthesizing →
//! Publishing` and ends either with the branch moved to one new commit or
//! with an error and the branch untouched. Validation-class errors are
//! raised before the first object is written.
//!
//! The engine holds no locks; concurrent writers are arbitrated by the
//! store's compare-and-set on the branch ref alone.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::content;
use crate::error::{Error, Result};
use crate::paths;
use crate::publish;
use crate::snapshot::{self, Snapshot};
use crate::store::ObjectStore;
use crate::tree::{self, TreeNode};
use crate::types::{
    BatchOutcome, BranchTip, ChangeReport, Edit, EngineOptions, FileRef, FileType, ObjectId, Stage,
};
use crate::validate;

/// Point in time after which a batch gives up.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn none() -> Self {
        Self(None)
    }

    pub(crate) fn from_timeout(timeout: Option<Duration>) -> Self {
        Self(timeout.map(|t| Instant::now() + t))
    }

    pub(crate) fn check(&self, stage: Stage) -> Result<()> {
        match self.0 {
            Some(at) if Instant::now() >= at => Err(Error::timeout(stage)),
            _ => Ok(()),
        }
    }
}

/// A batch that has been read, validated, written and synthesized, but not
/// yet published.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    branch: String,
    previous: BranchTip,
    tree: ObjectId,
    message: String,
    changes: ChangeReport,
    deadline: Deadline,
}

impl PreparedBatch {
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The tip the batch was computed against.
    pub fn previous(&self) -> BranchTip {
        self.previous
    }

    /// The synthesized root tree.
    pub fn tree(&self) -> ObjectId {
        self.tree
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn changes(&self) -> &ChangeReport {
        &self.changes
    }

    /// `true` when publishing would not change the branch.
    pub fn is_noop(&self) -> bool {
        self.tree == self.previous.tree
    }
}

/// Applies batches of edits to branches of an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct Engine<S> {
    store: S,
    options: EngineOptions,
}

impl<S: ObjectStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, EngineOptions::default())
    }

    pub fn with_options(store: S, options: EngineOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Read the current file listing of `branch`.
    pub fn snapshot(&self, branch: &str) -> Result<Snapshot> {
        paths::validate_branch_name(branch)?;
        snapshot::read_snapshot(&self.store, branch)
    }

    /// Read the current body of one file.
    pub fn read_file(&self, branch: &str, path: &str) -> Result<Vec<u8>> {
        paths::validate_branch_name(branch)?;
        snapshot::read_file(&self.store, branch, &paths::normalize_file_path(path)?)
    }

    /// Type of the entry at `path`, or `None` if nothing is there.
    pub fn file_type(&self, branch: &str, path: &str) -> Result<Option<FileType>> {
        paths::validate_branch_name(branch)?;
        snapshot::file_type_at(&self.store, branch, path)
    }

    /// Apply `edits` to `branch` as a single commit.
    ///
    /// A blank `message` becomes `"Apply N operations"`.
    ///
    /// # Errors
    /// Any validation-class error (see [`Error::is_validation`]) leaves the
    /// store unchanged. [`Error::RefConflict`] means another writer moved
    /// the branch first; objects written so far are unreferenced.
    /// [`Error::Timeout`] names the stage that ran out of time.
    pub fn apply_batch(&self, branch: &str, edits: &[Edit], message: &str) -> Result<BatchOutcome> {
        let prepared = self.prepare(branch, edits, message)?;
        self.publish(&prepared)
    }

    /// Run every stage up to, but not including, publishing.
    pub fn prepare(&self, branch: &str, edits: &[Edit], message: &str) -> Result<PreparedBatch> {
        let deadline = Deadline::from_timeout(self.options.timeout);
        paths::validate_branch_name(branch)?;
        let message = paths::format_commit_message(
            &format!("Apply {} operations", edits.len()),
            Some(message),
        );
        let edits = validate::normalize_edits(edits)?;

        // Reading
        deadline.check(Stage::Reading)?;
        log::debug!("reading '{}' for a batch of {} edits", branch, edits.len());
        let snap = snapshot::read_snapshot_until(&self.store, branch, &deadline)?;
        let previous = snap.tip();

        // Validating
        deadline.check(Stage::Validating)?;
        let edits = validate::expand(&snap, edits)?;
        let mut bodies = BTreeMap::new();
        for (path, file) in validate::bodies_needed(&snap, &edits) {
            deadline.check(Stage::Validating)?;
            bodies.insert(path, self.store.read_blob(file.oid)?);
        }
        let plan = validate::validate(&snap, &edits, &bodies)?;
        log::debug!(
            "validated {} edits: {} paths excluded, {} added",
            edits.len(),
            plan.excluded.len(),
            plan.added.len()
        );

        // Writing
        deadline.check(Stage::Writing)?;
        let added = content::write_pending(&self.store, &plan, &deadline)?;

        // Synthesizing
        deadline.check(Stage::Synthesizing)?;
        let files = tree::merge(&snap, &plan.excluded, &added);
        let changes = change_report(&snap, &files);
        let root = TreeNode::from_files(&files)?;
        let tree = tree::write_tree_until(&self.store, &root, &deadline)?;
        log::debug!(
            "synthesized tree {} with {} files for '{}'",
            tree,
            files.len(),
            branch
        );

        Ok(PreparedBatch {
            branch: branch.to_string(),
            previous,
            tree,
            message,
            changes,
            deadline,
        })
    }

    /// Commit a prepared batch and move its branch.
    ///
    /// A batch whose tree equals the previous tree commits nothing and
    /// returns an outcome with `committed == false`.
    pub fn publish(&self, prepared: &PreparedBatch) -> Result<BatchOutcome> {
        let previous = prepared.previous;
        if prepared.is_noop() {
            log::debug!("batch on '{}' changes nothing; not committing", prepared.branch);
            return Ok(BatchOutcome {
                branch: prepared.branch.clone(),
                commit: previous.commit,
                previous: previous.commit,
                tree: previous.tree,
                message: prepared.message.clone(),
                committed: false,
                changes: ChangeReport::new(),
            });
        }

        prepared.deadline.check(Stage::Publishing)?;
        let commit = publish::publish(
            &self.store,
            &prepared.branch,
            previous.commit,
            prepared.tree,
            &prepared.message,
        )?;
        log::info!(
            "committed {} to '{}' ({} changes): {}",
            commit,
            prepared.branch,
            prepared.changes.total(),
            prepared.message
        );

        Ok(BatchOutcome {
            branch: prepared.branch.clone(),
            commit,
            previous: previous.commit,
            tree: prepared.tree,
            message: prepared.message.clone(),
            committed: true,
            changes: prepared.changes.clone(),
        })
    }

    /// Whether a prepared batch is already the tip of its branch.
    ///
    /// Used after a timeout while publishing, when the branch may or may
    /// not have moved.
    pub fn check_landed(&self, prepared: &PreparedBatch) -> Result<bool> {
        publish::landed(
            &self.store,
            &prepared.branch,
            prepared.previous.commit,
            prepared.tree,
            &prepared.message,
        )
    }
}

/// Compare the final path set against the snapshot.
fn change_report(snap: &Snapshot, files: &BTreeMap<String, FileRef>) -> ChangeReport {
    let mut report = ChangeReport::new();
    for (path, file) in files {
        match snap.get(path) {
            None => report.add.push(path.clone()),
            Some(old) if old != file => report.update.push(path.clone()),
            Some(_) => {}
        }
    }
    report.delete = snap
        .paths()
        .filter(|p| !files.contains_key(*p))
        .map(str::to_string)
        .collect();
    report
}

/// Re-run `f` while it fails with [`Error::RefConflict`], up to `attempts`
/// extra times, sleeping with exponential backoff (10ms doubling, capped at
/// 200ms) in between.
///
/// `f` must redo the whole pipeline, reading a fresh snapshot each time.
///
/// ```
/// use gitbatch::{retry_on_conflict, Edit, Engine, MemoryStore};
///
/// let engine = Engine::new(MemoryStore::with_branch("main").unwrap());
/// let outcome = retry_on_conflict(3, || {
///     engine.apply_batch("main", &[Edit::write("x.txt", "1")], "add x")
/// })
/// .unwrap();
/// assert!(outcome.committed);
/// ```
pub fn retry_on_conflict<F, T>(attempts: u32, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_conflict() && attempt < attempts => {
                let backoff = Duration::from_millis((10 * 2u64.pow(attempt.min(5))).min(200));
                log::debug!("retrying after conflict in {:?}", backoff);
                std::thread::sleep(backoff);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
