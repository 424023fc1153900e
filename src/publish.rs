use crate::error::Result;
use crate::store::ObjectStore;
use crate::types::ObjectId;

/// Commit `tree` on top of `previous` and move `branch` to the new commit.
///
/// The branch only moves if it still points at `previous`. On
/// [`Error::RefConflict`](crate::Error::RefConflict) the commit stays in the
/// store unreferenced.
pub fn publish<S: ObjectStore>(
    store: &S,
    branch: &str,
    previous: ObjectId,
    tree: ObjectId,
    message: &str,
) -> Result<ObjectId> {
    let commit = store.write_commit(tree, &[previous], message)?;
    log::debug!("created commit {} on tree {}", commit, tree);

    if let Err(err) = store.compare_and_set_branch(branch, previous, commit) {
        if err.is_conflict() {
            log::warn!("{}", err);
        }
        return Err(err);
    }
    Ok(commit)
}

/// Whether `branch` now points at a commit with exactly this tree, parent
/// and message.
pub fn landed<S: ObjectStore>(
    store: &S,
    branch: &str,
    previous: ObjectId,
    tree: ObjectId,
    message: &str,
) -> Result<bool> {
    let tip = store.branch_tip(branch)?;
    if tip.commit == previous || tip.tree != tree {
        return Ok(false);
    }
    let info = store.read_commit(tip.commit)?;
    Ok(info.tree == tree && info.parents == [previous] && info.message == message)
}
