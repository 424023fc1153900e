mod common;

use std::thread;

use gitbatch::*;

#[test]
fn second_of_two_racing_batches_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine_with_files(dir.path());
    let start = common::tip(&engine, "main");

    let first = engine
        .prepare("main", &[Edit::write("first.txt", "1")], "first")
        .unwrap();
    let second = engine
        .prepare("main", &[Edit::write("second.txt", "2")], "second")
        .unwrap();
    assert_eq!(first.previous().commit, start);
    assert_eq!(second.previous().commit, start);

    let landed = engine.publish(&first).unwrap();
    let err = engine.publish(&second).unwrap_err();

    assert!(err.is_conflict());
    assert!(!err.is_validation());
    assert_eq!(common::tip(&engine, "main"), landed.commit);
    let paths = common::paths(&engine, "main");
    assert!(paths.contains(&"first.txt".to_string()));
    assert!(!paths.contains(&"second.txt".to_string()));
}

#[test]
fn conflicting_batch_can_be_redone() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine_with_files(dir.path());

    let stale = engine
        .prepare("main", &[Edit::replace("README.md", "readme", "docs")], "edit")
        .unwrap();
    engine
        .apply_batch("main", &[Edit::write("other.txt", "x")], "other")
        .unwrap();
    assert!(engine.publish(&stale).unwrap_err().is_conflict());

    let out = engine
        .apply_batch("main", &[Edit::replace("README.md", "readme", "docs")], "edit")
        .unwrap();
    assert!(out.committed);
    assert_eq!(common::read_text(&engine, "main", "README.md"), "# docs\n");
    assert_eq!(common::read_text(&engine, "main", "other.txt"), "x");
}

#[test]
fn check_landed_tells_published_from_stale() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine_with_files(dir.path());

    let prepared = engine
        .prepare("main", &[Edit::write("a.txt", "a")], "add a")
        .unwrap();
    assert!(!engine.check_landed(&prepared).unwrap());

    engine.publish(&prepared).unwrap();
    assert!(engine.check_landed(&prepared).unwrap());

    engine
        .apply_batch("main", &[Edit::write("b.txt", "b")], "add b")
        .unwrap();
    assert!(!engine.check_landed(&prepared).unwrap());
}

#[test]
fn parallel_writers_all_land_with_retry() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine_with_files(dir.path());
    let before = common::history_len(&engine, "main");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = engine.clone();
            thread::spawn(move || {
                let path = format!("worker-{}.txt", i);
                retry_on_conflict(50, || {
                    engine.apply_batch("main", &[Edit::write(path.as_str(), "done")], "")
                })
                .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().committed);
    }

    let paths = common::paths(&engine, "main");
    for i in 0..4 {
        assert!(paths.contains(&format!("worker-{}.txt", i)));
    }
    assert_eq!(common::history_len(&engine, "main"), before + 4);
}

#[test]
fn independent_handles_race_only_as_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine_with_files(dir.path());
    let repo_path = engine.store().path().to_path_buf();
    let before = common::history_len(&engine, "main");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let repo_path = repo_path.clone();
            thread::spawn(move || {
                let mut outcomes = Vec::new();
                for round in 0..5 {
                    let engine = Engine::new(GitStore::open(&repo_path, OpenOptions::default())?);
                    let path = format!("worker-{}/round-{}.txt", i, round);
                    outcomes.push(retry_on_conflict(100, || {
                        engine.apply_batch("main", &[Edit::write(path.as_str(), "done")], "")
                    })?);
                }
                Ok::<_, Error>(outcomes)
            })
        })
        .collect();

    for handle in handles {
        let outcomes = handle.join().unwrap().unwrap();
        assert!(outcomes.iter().all(|o| o.committed));
    }

    let paths = common::paths(&engine, "main");
    for i in 0..4 {
        for round in 0..5 {
            assert!(paths.contains(&format!("worker-{}/round-{}.txt", i, round)));
        }
    }
    assert_eq!(common::history_len(&engine, "main"), before + 20);
}
