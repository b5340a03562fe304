//! The storage seam.
//!
//! The core never touches disks or sockets itself; everything goes through
//! the [`Store`] contract, a git-shaped content-addressed object store:
//! blobs, trees and commits addressed by hash, plus named refs and the two
//! process-wide Lamport clocks.
//!
//! Two implementations live here: [`GitStore`] over a real git repository,
//! and [`MemoryStore`], a deterministic in-process double for tests and
//! tooling.

mod git;
mod memory;

use std::io;

use thiserror::Error;

pub use git::{GitStore, GitStoreOptions};
pub use memory::MemoryStore;

use crate::core::clock::LamportTime;
use crate::core::identity::ObjectId;

/// What a tree entry points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
}

/// A named pointer inside a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub kind: ObjectKind,
    pub id: ObjectId,
    pub name: String,
}

impl TreeEntry {
    pub fn blob(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Blob,
            id,
            name: name.into(),
        }
    }

    pub fn tree(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Tree,
            id,
            name: name.into(),
        }
    }
}

/// Failures crossing the store boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("object `{0}` not found")]
    MissingObject(ObjectId),

    #[error("ref `{0}` not found")]
    MissingRef(String),

    #[error("no common ancestor between {a} and {b}")]
    NoCommonAncestor { a: ObjectId, b: ObjectId },

    #[error("failed to persist clock state: {0}")]
    Clock(#[source] io::Error),

    #[error("store corruption: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// Contract a content-addressed backend must satisfy.
///
/// All methods take `&self`: implementations own whatever interior locking
/// they need, and in particular the four clock operations must serialize
/// against each other. Ref updates must be atomic.
pub trait Store {
    // -- objects --

    fn store_blob(&self, data: &[u8]) -> Result<ObjectId, StoreError>;
    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>, StoreError>;

    /// Store a tree. Implementations canonicalize entry order before
    /// hashing, so identical logical trees produce identical ids.
    fn store_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId, StoreError>;
    fn list_tree_entries(&self, id: &ObjectId) -> Result<Vec<TreeEntry>, StoreError>;

    fn store_commit(&self, tree: &ObjectId) -> Result<ObjectId, StoreError>;
    fn store_commit_with_parent(
        &self,
        tree: &ObjectId,
        parent: &ObjectId,
    ) -> Result<ObjectId, StoreError>;
    fn tree_of_commit(&self, commit: &ObjectId) -> Result<ObjectId, StoreError>;

    // -- history --

    /// Commits reachable from `reference`, oldest first along the ancestor
    /// chain.
    fn list_commits(&self, reference: &str) -> Result<Vec<ObjectId>, StoreError>;
    fn find_common_ancestor(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, StoreError>;

    // -- refs --

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
    fn update_ref(&self, reference: &str, target: &ObjectId) -> Result<(), StoreError>;

    /// Terminal path component of every ref under `prefix`.
    fn list_ids(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let refs = self.list_refs(prefix)?;
        Ok(refs
            .iter()
            .map(|r| r.rsplit('/').next().unwrap_or(r).to_string())
            .collect())
    }

    // -- clocks --

    fn increment_create_clock(&self) -> Result<LamportTime, StoreError>;
    fn increment_edit_clock(&self) -> Result<LamportTime, StoreError>;
    fn witness_create(&self, time: LamportTime) -> Result<(), StoreError>;
    fn witness_edit(&self, time: LamportTime) -> Result<(), StoreError>;
}
