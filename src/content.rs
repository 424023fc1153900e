use std::collections::BTreeMap;

use crate::engine::Deadline;
use crate::error::Result;
use crate::store::ObjectStore;
use crate::types::{FileRef, ObjectId, Stage};
use crate::validate::{Pending, Plan};

/// Store `data` as a content object and return its id.
///
/// Writing the same bytes twice yields the same id.
pub fn write_content<S: ObjectStore>(store: &S, data: &[u8]) -> Result<ObjectId> {
    store.write_blob(data)
}

/// Write every new body in `plan` and return the final reference of each
/// added path.
///
/// Identical bodies are written once. Moved files reuse their existing
/// object and cost no write.
pub(crate) fn write_pending<S: ObjectStore>(
    store: &S,
    plan: &Plan,
    deadline: &Deadline,
) -> Result<BTreeMap<String, FileRef>> {
    let mut written: BTreeMap<&[u8], ObjectId> = BTreeMap::new();
    let mut refs = BTreeMap::new();

    for (path, pending) in &plan.added {
        let file = match pending {
            Pending::Existing(file) => *file,
            Pending::Content { data, mode } => {
                let oid = match written.get(data.as_slice()) {
                    Some(oid) => *oid,
                    None => {
                        deadline.check(Stage::Writing)?;
                        let oid = write_content(store, data)?;
                        written.insert(data.as_slice(), oid);
                        oid
                    }
                };
                FileRef::new(oid, *mode)
            }
        };
        refs.insert(path.clone(), file);
    }

    log::debug!(
        "wrote {} content objects for {} paths",
        written.len(),
        refs.len()
    );
    Ok(refs)
}
