mod common;

use gitbatch::*;

#[test]
fn open_creates_branch_with_empty_tree() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");

    let tip = store.branch_tip("main").unwrap();
    assert!(store.list_tree(tip.tree).unwrap().is_empty());
    let info = store.read_commit(tip.commit).unwrap();
    assert!(info.parents.is_empty());
    assert_eq!(info.message, "Initialize main");
    assert_eq!(store.branches().unwrap(), vec!["main"]);
}

#[test]
fn open_missing_without_create_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = GitStore::open(dir.path().join("nope.git"), OpenOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn reopen_sees_committed_state() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine_with_files(dir.path());
    let tip = common::tip(&engine, "main");

    let reopened = GitStore::open(dir.path().join("test.git"), OpenOptions::default()).unwrap();
    assert_eq!(reopened.branch_tip("main").unwrap().commit, tip);
}

#[test]
fn open_rejects_bad_initial_branch() {
    let dir = tempfile::tempdir().unwrap();
    let err = GitStore::open(dir.path().join("x.git"), OpenOptions {
        create: true,
        branch: Some("bad name".into()),
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, Error::InvalidRefName(_)));
}

#[test]
fn content_writes_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let a = store.write_blob(b"same bytes").unwrap();
    let b = store.write_blob(b"same bytes").unwrap();
    assert_eq!(a, b);
    assert_eq!(store.read_blob(a).unwrap(), b"same bytes");
}

#[test]
fn object_ids_agree_with_memory_store() {
    let dir = tempfile::tempdir().unwrap();
    let git = common::create_store(dir.path(), "main");
    let memory = MemoryStore::new();

    let git_blob = git.write_blob(b"hello\n").unwrap();
    let mem_blob = memory.write_blob(b"hello\n").unwrap();
    assert_eq!(git_blob, mem_blob);

    let items = [
        TreeItem::new("b.txt", git_blob, MODE_BLOB),
        TreeItem::new("a.sh", git_blob, MODE_BLOB_EXEC),
    ];
    assert_eq!(git.write_tree(&items).unwrap(), memory.write_tree(&items).unwrap());
}

#[test]
fn compare_and_set_moves_only_from_expected() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let tip = store.branch_tip("main").unwrap();

    let next = store.write_commit(tip.tree, &[tip.commit], "next").unwrap();
    store.compare_and_set_branch("main", tip.commit, next).unwrap();
    assert_eq!(store.branch_tip("main").unwrap().commit, next);

    let other = store.write_commit(tip.tree, &[tip.commit], "other").unwrap();
    let err = store
        .compare_and_set_branch("main", tip.commit, other)
        .unwrap_err();
    match err {
        Error::RefConflict {
            branch,
            expected,
            actual,
        } => {
            assert_eq!(branch, "main");
            assert_eq!(expected, tip.commit.to_string());
            assert_eq!(actual, next.to_string());
        }
        other => panic!("expected RefConflict, got {:?}", other),
    }
    assert_eq!(store.branch_tip("main").unwrap().commit, next);
}

#[test]
fn missing_objects_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let bogus = ObjectId::from_str("1111111111111111111111111111111111111111").unwrap();
    assert!(matches!(store.list_tree(bogus), Err(Error::NotFound(_))));
    assert!(matches!(store.read_blob(bogus), Err(Error::NotFound(_))));
    assert!(matches!(store.branch_tip("ghost"), Err(Error::NotFound(_))));
}

#[test]
fn commits_use_configured_signature() {
    let dir = tempfile::tempdir().unwrap();
    let store = GitStore::open(dir.path().join("sig.git"), OpenOptions {
        create: true,
        branch: Some("main".into()),
        author: Some("Ada".into()),
        email: Some("ada@example.com".into()),
    })
    .unwrap();
    assert_eq!(store.signature().name, "Ada");
    assert_eq!(store.signature().email, "ada@example.com");
    assert!(store.path().ends_with("sig.git"));
}

#[test]
fn non_utf8_entry_names_are_refused_not_renamed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(common::create_store(dir.path(), "main"));
    let store = engine.store();
    let tip = store.branch_tip("main").unwrap();

    // Commit a latin-1 file name, which git allows but UTF-8 cannot hold.
    let raw_name = b"caf\xe9.txt".to_vec();
    let blob = store.write_blob(b"menu").unwrap();
    let tree = {
        let repo = git2::Repository::open_bare(store.path()).unwrap();
        let mut builder = repo.treebuilder(None).unwrap();
        builder.insert(raw_name.clone(), blob, 0o100644).unwrap();
        builder.write().unwrap()
    };
    let commit = store.write_commit(tree, &[tip.commit], "raw name").unwrap();
    store.compare_and_set_branch("main", tip.commit, commit).unwrap();

    assert!(matches!(store.list_tree(tree), Err(Error::InvalidPath(_))));
    let err = engine
        .apply_batch("main", &[Edit::write("other.txt", "x")], "add other")
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPath(_)));
    assert_eq!(common::tip(&engine, "main"), commit);

    let repo = git2::Repository::open_bare(store.path()).unwrap();
    let stored = repo.find_tree(tree).unwrap();
    let names: Vec<Vec<u8>> = stored.iter().map(|e| e.name_bytes().to_vec()).collect();
    assert_eq!(names, vec![raw_name]);
}

#[test]
fn compare_and_set_against_held_lock_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let tip = store.branch_tip("main").unwrap();
    let next = store.write_commit(tip.tree, &[tip.commit], "next").unwrap();

    // Another handle is mid-update on the same ref.
    let lock = store.path().join("refs").join("heads").join("main.lock");
    std::fs::write(&lock, b"").unwrap();

    let err = store
        .compare_and_set_branch("main", tip.commit, next)
        .unwrap_err();
    assert!(err.is_conflict(), "got {:?}", err);
    assert_eq!(store.branch_tip("main").unwrap().commit, tip.commit);

    std::fs::remove_file(&lock).unwrap();
    store.compare_and_set_branch("main", tip.commit, next).unwrap();
    assert_eq!(store.branch_tip("main").unwrap().commit, next);
}
