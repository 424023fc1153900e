//! Atomic multi-file commits on git branches.
//!
//! `gitbatch` applies a batch of path-level edits (writes, single-match text
//! replacements, deletes and moves) to a branch as exactly one new commit.
//! A batch either lands completely or leaves the branch untouched: it is
//! checked as a whole before any object is written, and the branch only
//! moves through a compare-and-set against the tip the batch was computed
//! from.
//!
//! # Key types
//!
//! - [`ObjectStore`]: the versioned store a batch is committed to.
//!   [`GitStore`] backs it with a bare git repository; [`MemoryStore`] keeps
//!   everything in memory and can inject failures.
//! - [`Engine`]: runs the pipeline (snapshot, validate, write content,
//!   synthesize the tree, publish).
//! - [`Edit`]: one requested change. A batch is a slice of them.
//! - [`BatchOutcome`]: the resulting commit and the paths it touched.
//!
//! # Quick example
//!
//! ```rust,no_run
//! use gitbatch::{Edit, Engine, GitStore, OpenOptions};
//!
//! let store = GitStore::open("/tmp/my-repo.git", OpenOptions {
//!     create: true,
//!     branch: Some("main".into()),
//!     ..Default::default()
//! }).unwrap();
//! let engine = Engine::new(store);
//!
//! let outcome = engine.apply_batch("main", &[
//!     Edit::move_to("src/a.py", "src/b.py"),
//!     Edit::write("README.md", "v2"),
//! ], "Rename a.py").unwrap();
//! println!("{} touched {:?}", outcome.commit, outcome.changed_paths());
//! ```

pub mod content;
pub mod engine;
pub mod error;
pub mod memory;
pub mod paths;
pub mod publish;
pub mod snapshot;
pub mod store;
pub mod tools;
pub mod tree;
pub mod types;
pub mod validate;

// Re-export primary public types at crate root.
pub use engine::{retry_on_conflict, Engine, PreparedBatch};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use snapshot::Snapshot;
pub use store::{GitStore, ObjectStore};
pub use types::*;
