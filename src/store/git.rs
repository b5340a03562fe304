//! Git-backed store.
//!
//! A thin adapter from the [`Store`] contract onto a real git repository via
//! `git2`: blobs and trees map to their git namesakes, commits carry no
//! message (all meaning lives in the tree), refs are plain git refs. Trees
//! built through `TreeBuilder` are canonicalized by git itself, so identical
//! logical trees always produce identical ids.
//!
//! The two Lamport clocks persist as decimal text files inside the git
//! directory, guarded by the store's mutex.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use git2::{ErrorCode, ObjectType, Oid, Repository, Signature, Sort};
use tracing::trace;

use super::{ObjectKind, Store, StoreError, TreeEntry};
use crate::core::clock::{LamportClock, LamportTime};
use crate::core::identity::ObjectId;

const CLOCK_DIR: &str = "burr";
const CREATE_CLOCK_FILE: &str = "create-clock";
const EDIT_CLOCK_FILE: &str = "edit-clock";

const BLOB_MODE: i32 = 0o100644;
const TREE_MODE: i32 = 0o040000;

/// Committer identity recorded on pack commits.
#[derive(Clone, Debug)]
pub struct GitStoreOptions {
    pub committer_name: String,
    pub committer_email: String,
}

impl Default for GitStoreOptions {
    fn default() -> Self {
        Self {
            committer_name: "burr".to_string(),
            committer_email: "burr@localhost".to_string(),
        }
    }
}

struct Clocks {
    create: LamportClock,
    edit: LamportClock,
}

/// [`Store`] implementation over a git repository.
pub struct GitStore {
    // git2 repositories are Send but not Sync; the mutex makes the store
    // shareable across the streaming producer and its consumer.
    repo: Mutex<Repository>,
    clocks: Mutex<Clocks>,
    clock_dir: PathBuf,
    options: GitStoreOptions,
}

impl GitStore {
    /// Open an existing repository.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_repository(Repository::open(path)?, GitStoreOptions::default())
    }

    /// Create a repository at `path` and open it.
    pub fn init(path: &Path) -> Result<Self, StoreError> {
        Self::from_repository(Repository::init(path)?, GitStoreOptions::default())
    }

    pub fn from_repository(
        repo: Repository,
        options: GitStoreOptions,
    ) -> Result<Self, StoreError> {
        let clock_dir = repo.path().join(CLOCK_DIR);
        fs::create_dir_all(&clock_dir).map_err(StoreError::Clock)?;
        let clocks = Clocks {
            create: load_clock(&clock_dir.join(CREATE_CLOCK_FILE))?,
            edit: load_clock(&clock_dir.join(EDIT_CLOCK_FILE))?,
        };
        Ok(Self {
            repo: Mutex::new(repo),
            clocks: Mutex::new(clocks),
            clock_dir,
            options,
        })
    }

    fn repo(&self) -> MutexGuard<'_, Repository> {
        self.repo.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn clocks(&self) -> MutexGuard<'_, Clocks> {
        self.clocks.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn signature(&self) -> Result<Signature<'static>, StoreError> {
        Ok(Signature::now(
            &self.options.committer_name,
            &self.options.committer_email,
        )?)
    }

    fn persist_clock(&self, file: &str, time: LamportTime) -> Result<(), StoreError> {
        fs::write(self.clock_dir.join(file), time.to_string()).map_err(StoreError::Clock)
    }
}

fn load_clock(path: &Path) -> Result<LamportClock, StoreError> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let value: u64 = raw.trim().parse().map_err(|_| {
                StoreError::Corrupt(format!("clock file {} is not a number", path.display()))
            })?;
            Ok(LamportClock::with_time(LamportTime(value)))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(LamportClock::new()),
        Err(err) => Err(StoreError::Clock(err)),
    }
}

fn to_id(oid: Oid) -> ObjectId {
    // git oids are 40 lowercase hex by construction.
    ObjectId::new_unchecked(oid.to_string())
}

fn to_oid(id: &ObjectId) -> Result<Oid, StoreError> {
    Ok(Oid::from_str(id.as_str())?)
}

fn missing_object(err: git2::Error, id: &ObjectId) -> StoreError {
    if err.code() == ErrorCode::NotFound {
        StoreError::MissingObject(id.clone())
    } else {
        StoreError::Git(err)
    }
}

impl Store for GitStore {
    fn store_blob(&self, data: &[u8]) -> Result<ObjectId, StoreError> {
        Ok(to_id(self.repo().blob(data)?))
    }

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>, StoreError> {
        let repo = self.repo();
        let blob = repo
            .find_blob(to_oid(id)?)
            .map_err(|err| missing_object(err, id))?;
        Ok(blob.content().to_vec())
    }

    fn store_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId, StoreError> {
        let repo = self.repo();
        let mut builder = repo.treebuilder(None)?;
        for entry in entries {
            let mode = match entry.kind {
                ObjectKind::Blob => BLOB_MODE,
                ObjectKind::Tree => TREE_MODE,
            };
            builder.insert(&entry.name, to_oid(&entry.id)?, mode)?;
        }
        Ok(to_id(builder.write()?))
    }

    fn list_tree_entries(&self, id: &ObjectId) -> Result<Vec<TreeEntry>, StoreError> {
        let repo = self.repo();
        let tree = repo
            .find_tree(to_oid(id)?)
            .map_err(|err| missing_object(err, id))?;

        let mut entries = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let kind = match entry.kind() {
                Some(ObjectType::Blob) => ObjectKind::Blob,
                Some(ObjectType::Tree) => ObjectKind::Tree,
                other => {
                    return Err(StoreError::Corrupt(format!(
                        "unexpected object type {other:?} in tree {id}"
                    )));
                }
            };
            let name = entry.name().ok_or_else(|| {
                StoreError::Corrupt(format!("non-utf8 entry name in tree {id}"))
            })?;
            entries.push(TreeEntry {
                kind,
                id: to_id(entry.id()),
                name: name.to_string(),
            });
        }
        Ok(entries)
    }

    fn store_commit(&self, tree: &ObjectId) -> Result<ObjectId, StoreError> {
        let sig = self.signature()?;
        let repo = self.repo();
        let tree = repo
            .find_tree(to_oid(tree)?)
            .map_err(|err| missing_object(err, tree))?;
        Ok(to_id(repo.commit(None, &sig, &sig, "", &tree, &[])?))
    }

    fn store_commit_with_parent(
        &self,
        tree: &ObjectId,
        parent: &ObjectId,
    ) -> Result<ObjectId, StoreError> {
        let sig = self.signature()?;
        let repo = self.repo();
        let tree = repo
            .find_tree(to_oid(tree)?)
            .map_err(|err| missing_object(err, tree))?;
        let parent = repo
            .find_commit(to_oid(parent)?)
            .map_err(|err| missing_object(err, parent))?;
        Ok(to_id(repo.commit(None, &sig, &sig, "", &tree, &[&parent])?))
    }

    fn tree_of_commit(&self, commit: &ObjectId) -> Result<ObjectId, StoreError> {
        let repo = self.repo();
        let commit = repo
            .find_commit(to_oid(commit)?)
            .map_err(|err| missing_object(err, commit))?;
        Ok(to_id(commit.tree_id()))
    }

    fn list_commits(&self, reference: &str) -> Result<Vec<ObjectId>, StoreError> {
        let repo = self.repo();
        let mut walk = repo.revwalk()?;
        walk.push_ref(reference).map_err(|err| {
            if err.code() == ErrorCode::NotFound {
                StoreError::MissingRef(reference.to_string())
            } else {
                StoreError::Git(err)
            }
        })?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

        let mut commits = Vec::new();
        for oid in walk {
            commits.push(to_id(oid?));
        }
        trace!(reference, commits = commits.len(), "walked commit chain");
        Ok(commits)
    }

    fn find_common_ancestor(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, StoreError> {
        let repo = self.repo();
        match repo.merge_base(to_oid(a)?, to_oid(b)?) {
            Ok(oid) => Ok(to_id(oid)),
            Err(err) if err.code() == ErrorCode::NotFound => Err(StoreError::NoCommonAncestor {
                a: a.clone(),
                b: b.clone(),
            }),
            Err(err) => Err(StoreError::Git(err)),
        }
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let repo = self.repo();
        let glob = format!("{prefix}*");
        let mut refs = Vec::new();
        for name in repo.references_glob(&glob)?.names() {
            let name = name?;
            refs.push(name.to_string());
        }
        refs.sort();
        Ok(refs)
    }

    fn update_ref(&self, reference: &str, target: &ObjectId) -> Result<(), StoreError> {
        // Local updates are fast-forward by construction (commit chains off
        // the previous head); non-fast-forward protection against concurrent
        // writers is the ref transaction of the backing git implementation.
        self.repo()
            .reference(reference, to_oid(target)?, true, "pack commit")?;
        Ok(())
    }

    fn increment_create_clock(&self) -> Result<LamportTime, StoreError> {
        let mut clocks = self.clocks();
        let time = clocks.create.increment();
        self.persist_clock(CREATE_CLOCK_FILE, time)?;
        Ok(time)
    }

    fn increment_edit_clock(&self) -> Result<LamportTime, StoreError> {
        let mut clocks = self.clocks();
        let time = clocks.edit.increment();
        self.persist_clock(EDIT_CLOCK_FILE, time)?;
        Ok(time)
    }

    fn witness_create(&self, time: LamportTime) -> Result<(), StoreError> {
        let mut clocks = self.clocks();
        clocks.create.witness(time);
        self.persist_clock(CREATE_CLOCK_FILE, clocks.create.time())
    }

    fn witness_edit(&self, time: LamportTime) -> Result<(), StoreError> {
        let mut clocks = self.clocks();
        clocks.edit.witness(time);
        self.persist_clock(EDIT_CLOCK_FILE, clocks.edit.time())
    }
}
