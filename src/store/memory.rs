//! Deterministic in-process store.
//!
//! Implements the full [`Store`] contract with no I/O: object ids are
//! truncated sha256 of a domain-prefixed encoding, commits form linear
//! parent chains, refs live in a plain map. Meant as a test double and for
//! tooling that wants the data model without a repository on disk.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use super::{ObjectKind, Store, StoreError, TreeEntry};
use crate::core::clock::{LamportClock, LamportTime};
use crate::core::identity::ObjectId;

#[derive(Clone, Debug)]
struct CommitNode {
    tree: ObjectId,
    parent: Option<ObjectId>,
}

#[derive(Default)]
struct Inner {
    blobs: HashMap<ObjectId, Vec<u8>>,
    trees: HashMap<ObjectId, Vec<TreeEntry>>,
    commits: HashMap<ObjectId, CommitNode>,
    refs: BTreeMap<String, ObjectId>,
    create_clock: LamportClock,
    edit_clock: LamportClock,
}

/// In-memory [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Object ids are sha256 over a domain-tagged encoding, truncated to the
/// 40-hex id width the contract requires.
fn object_id(domain: &str, payload: &[u8]) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update([0]);
    hasher.update(payload);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(40);
    for byte in &digest[..20] {
        hex.push_str(&format!("{byte:02x}"));
    }
    ObjectId::new_unchecked(hex)
}

fn canonical_tree_bytes(entries: &[TreeEntry]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for entry in entries {
        let kind = match entry.kind {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
        };
        bytes.extend_from_slice(kind.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(entry.name.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(entry.id.as_str().as_bytes());
        bytes.push(b'\n');
    }
    bytes
}

impl Store for MemoryStore {
    fn store_blob(&self, data: &[u8]) -> Result<ObjectId, StoreError> {
        let id = object_id("blob", data);
        self.inner().blobs.insert(id.clone(), data.to_vec());
        Ok(id)
    }

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>, StoreError> {
        self.inner()
            .blobs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::MissingObject(id.clone()))
    }

    fn store_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId, StoreError> {
        // Canonical entry order, so identical logical trees hash identically
        // no matter how the caller ordered them.
        let mut entries = entries.to_vec();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let id = object_id("tree", &canonical_tree_bytes(&entries));
        self.inner().trees.insert(id.clone(), entries);
        Ok(id)
    }

    fn list_tree_entries(&self, id: &ObjectId) -> Result<Vec<TreeEntry>, StoreError> {
        self.inner()
            .trees
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::MissingObject(id.clone()))
    }

    fn store_commit(&self, tree: &ObjectId) -> Result<ObjectId, StoreError> {
        self.store_commit_node(tree.clone(), None)
    }

    fn store_commit_with_parent(
        &self,
        tree: &ObjectId,
        parent: &ObjectId,
    ) -> Result<ObjectId, StoreError> {
        if !self.inner().commits.contains_key(parent) {
            return Err(StoreError::MissingObject(parent.clone()));
        }
        self.store_commit_node(tree.clone(), Some(parent.clone()))
    }

    fn tree_of_commit(&self, commit: &ObjectId) -> Result<ObjectId, StoreError> {
        self.inner()
            .commits
            .get(commit)
            .map(|node| node.tree.clone())
            .ok_or_else(|| StoreError::MissingObject(commit.clone()))
    }

    fn list_commits(&self, reference: &str) -> Result<Vec<ObjectId>, StoreError> {
        let inner = self.inner();
        let head = inner
            .refs
            .get(reference)
            .cloned()
            .ok_or_else(|| StoreError::MissingRef(reference.to_string()))?;

        let mut chain = Vec::new();
        let mut cursor = Some(head);
        while let Some(commit) = cursor {
            let node = inner
                .commits
                .get(&commit)
                .ok_or_else(|| StoreError::MissingObject(commit.clone()))?;
            cursor = node.parent.clone();
            chain.push(commit);
        }
        chain.reverse();
        Ok(chain)
    }

    fn find_common_ancestor(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, StoreError> {
        let inner = self.inner();
        let ancestors_of_a = ancestors(&inner, a)?;
        let mut cursor = Some(b.clone());
        while let Some(commit) = cursor {
            if ancestors_of_a.contains(&commit) {
                return Ok(commit);
            }
            let node = inner
                .commits
                .get(&commit)
                .ok_or_else(|| StoreError::MissingObject(commit.clone()))?;
            cursor = node.parent.clone();
        }
        Err(StoreError::NoCommonAncestor {
            a: a.clone(),
            b: b.clone(),
        })
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner()
            .refs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn update_ref(&self, reference: &str, target: &ObjectId) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if !inner.commits.contains_key(target) {
            return Err(StoreError::MissingObject(target.clone()));
        }
        inner.refs.insert(reference.to_string(), target.clone());
        Ok(())
    }

    fn increment_create_clock(&self) -> Result<LamportTime, StoreError> {
        Ok(self.inner().create_clock.increment())
    }

    fn increment_edit_clock(&self) -> Result<LamportTime, StoreError> {
        Ok(self.inner().edit_clock.increment())
    }

    fn witness_create(&self, time: LamportTime) -> Result<(), StoreError> {
        self.inner().create_clock.witness(time);
        Ok(())
    }

    fn witness_edit(&self, time: LamportTime) -> Result<(), StoreError> {
        self.inner().edit_clock.witness(time);
        Ok(())
    }
}

impl MemoryStore {
    fn store_commit_node(
        &self,
        tree: ObjectId,
        parent: Option<ObjectId>,
    ) -> Result<ObjectId, StoreError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(tree.as_str().as_bytes());
        if let Some(parent) = &parent {
            payload.push(b'\n');
            payload.extend_from_slice(parent.as_str().as_bytes());
        }
        let id = object_id("commit", &payload);
        self.inner()
            .commits
            .insert(id.clone(), CommitNode { tree, parent });
        Ok(id)
    }
}

fn ancestors(
    inner: &Inner,
    head: &ObjectId,
) -> Result<std::collections::HashSet<ObjectId>, StoreError> {
    let mut seen = std::collections::HashSet::new();
    let mut cursor = Some(head.clone());
    while let Some(commit) = cursor {
        let node = inner
            .commits
            .get(&commit)
            .ok_or_else(|| StoreError::MissingObject(commit.clone()))?;
        cursor = node.parent.clone();
        seen.insert(commit);
    }
    Ok(seen)
}
