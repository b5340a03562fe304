//! Distributed, offline-first issue tracking on top of a git-shaped store.
//!
//! Each bug is an independently mergeable stream of operations (create,
//! comment, label, close, ...) persisted as a chain of append-only operation
//! packs: one commit per pack, one ref per bug, Lamport clocks witnessed
//! across replicas for causal ordering. Replaying the operations of a bug
//! deterministically materializes a [`Snapshot`].
//!
//! The storage backend is pluggable through the [`Store`] contract; a
//! [`GitStore`] over a real repository and an in-process [`MemoryStore`]
//! are provided.
//!
//! ```no_run
//! use burr::{Author, Bug, CreateOp, GitStore, Operation};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = GitStore::open(std::path::Path::new("."))?;
//!
//! let mut bug = Bug::new();
//! bug.append(Operation::Create(CreateOp {
//!     author: Author::new("alice")?,
//!     unix_time: 1700000000,
//!     title: "parser panics on empty input".into(),
//!     message: "found while fuzzing".into(),
//!     files: vec![],
//! }));
//! bug.commit(&store)?;
//!
//! println!("filed {}", bug.human_id());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod core;
pub mod store;
pub mod stream;

pub use crate::core::{
    Author, BUGS_REF_PREFIX, Bug, Comment, CreateOp, AddCommentOp, ChangeLabelsOp, EditCommentOp,
    Error, HUMAN_ID_LENGTH, ID_LENGTH, Label, LamportClock, LamportTime, ObjectId, OpDigest,
    OpKind, Operation, OperationPack, SetMetadataOp, SetStatusOp, SetTitleOp, Snapshot, Status,
    find_local, list_local_ids, read_local, read_remote, remote_bugs_ref_prefix,
};
pub use crate::store::{
    GitStore, GitStoreOptions, MemoryStore, ObjectKind, Store, StoreError, TreeEntry,
};
pub use crate::stream::{BugStream, read_all_local, read_all_remote};
