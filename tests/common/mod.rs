use std::path::Path;

use gitbatch::*;

pub fn create_store(dir: &Path, branch: &str) -> GitStore {
    GitStore::open(dir.join("test.git"), OpenOptions {
        create: true,
        branch: Some(branch.into()),
        ..Default::default()
    })
    .unwrap()
}

/// Commit `files` to `branch` in one batch.
#[allow(dead_code)]
pub fn seed<S: ObjectStore>(engine: &Engine<S>, branch: &str, files: &[(&str, &str)]) {
    let edits: Vec<Edit> = files.iter().map(|(p, c)| Edit::write(*p, *c)).collect();
    engine.apply_batch(branch, &edits, "seed").unwrap();
}

#[allow(dead_code)]
pub fn engine_with_files(dir: &Path) -> Engine<GitStore> {
    let engine = Engine::new(create_store(dir, "main"));
    seed(&engine, "main", &[
        ("README.md", "# readme\n"),
        ("src/a.py", "print('a')\n"),
        ("src/util/helpers.py", "def helper():\n    pass\n"),
        ("docs/guide.md", "guide\n"),
    ]);
    engine
}

#[allow(dead_code)]
pub fn memory_engine(files: &[(&str, &str)]) -> (MemoryStore, Engine<MemoryStore>) {
    let store = MemoryStore::with_branch("main").unwrap();
    let engine = Engine::new(store.clone());
    if !files.is_empty() {
        seed(&engine, "main", files);
    }
    store.clear_operations();
    (store, engine)
}

#[allow(dead_code)]
pub fn paths<S: ObjectStore>(engine: &Engine<S>, branch: &str) -> Vec<String> {
    engine
        .snapshot(branch)
        .unwrap()
        .paths()
        .map(str::to_string)
        .collect()
}

#[allow(dead_code)]
pub fn read_text<S: ObjectStore>(engine: &Engine<S>, branch: &str, path: &str) -> String {
    String::from_utf8(engine.read_file(branch, path).unwrap()).unwrap()
}

#[allow(dead_code)]
pub fn tip<S: ObjectStore>(engine: &Engine<S>, branch: &str) -> ObjectId {
    engine.store().branch_tip(branch).unwrap().commit
}

/// Number of commits on the first-parent chain ending at `branch`.
#[allow(dead_code)]
pub fn history_len<S: ObjectStore>(engine: &Engine<S>, branch: &str) -> usize {
    let mut commit = Some(tip(engine, branch));
    let mut count = 0;
    while let Some(oid) = commit {
        count += 1;
        commit = engine.store().read_commit(oid).unwrap().parents.first().copied();
    }
    count
}
