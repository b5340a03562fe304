//! The Bug aggregate.
//!
//! A bug is an independently mergeable stream of operations, organized the
//! way it persists in the store: a chain of commits, each carrying one
//! operation pack, under the ref `refs/bugs/<id>`. The id is the hash of
//! the first commit and never changes afterwards.
//!
//! Local mutation is append-then-commit: operations pile up in a staging
//! pack, and [`Bug::commit`] turns the staging area into one commit.
//! Divergent replicas reconcile with [`Bug::merge`], which adopts the other
//! side's commits and re-parents the local divergent ones on top; operations
//! themselves are never reordered or rewritten, so the rebase is
//! semantics-preserving by construction.

use std::mem;

use tracing::{debug, trace};

use super::clock::LamportTime;
use super::error::Error;
use super::identity::ObjectId;
use super::operation::{OpKind, Operation};
use super::pack::OperationPack;
use super::snapshot::Snapshot;
use crate::store::{Store, TreeEntry};

/// Namespace of local bug refs.
pub const BUGS_REF_PREFIX: &str = "refs/bugs/";

/// Namespace of remote-tracking bug refs for a given remote.
pub fn remote_bugs_ref_prefix(remote: &str) -> String {
    format!("refs/remotes/{remote}/bugs/")
}

const OPS_ENTRY: &str = "ops";
const ROOT_ENTRY: &str = "root";
const MEDIA_ENTRY: &str = "media";
const CREATE_CLOCK_PREFIX: &str = "create-clock-";
const EDIT_CLOCK_PREFIX: &str = "edit-clock-";

/// A bug thread: committed packs plus a staging area, with the pointers and
/// clock samples needed to round-trip through the store.
#[derive(Clone, Debug, Default)]
pub struct Bug {
    create_time: LamportTime,
    edit_time: LamportTime,

    id: Option<ObjectId>,

    last_commit: Option<ObjectId>,
    root_pack: Option<ObjectId>,

    packs: Vec<OperationPack>,
    staging: OperationPack,
}

impl Bug {
    /// A fresh bug: no id, no clocks, nothing staged.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bug's identity: the hash of its root commit.
    ///
    /// # Panics
    ///
    /// Panics if the bug was never committed. Using the id of an unstored
    /// bug is a programming error, not a runtime condition.
    pub fn id(&self) -> &ObjectId {
        match &self.id {
            Some(id) => id,
            None => panic!("no id yet: bug was never committed"),
        }
    }

    /// The truncated id shown to humans.
    pub fn human_id(&self) -> &str {
        self.id().short()
    }

    pub fn create_time(&self) -> LamportTime {
        self.create_time
    }

    pub fn edit_time(&self) -> LamportTime {
        self.edit_time
    }

    /// Head commit on the bug's ref, if any.
    pub fn last_commit(&self) -> Option<&ObjectId> {
        self.last_commit.as_ref()
    }

    /// Hash of the first commit. Identical to the id: the root commit is
    /// what defines a bug's identity.
    pub fn root_commit(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    /// Blob holding the first operation pack; immutable after first commit.
    pub fn root_pack(&self) -> Option<&ObjectId> {
        self.root_pack.as_ref()
    }

    /// The committed packs, oldest first.
    pub fn packs(&self) -> &[OperationPack] {
        &self.packs
    }

    /// Append an operation to the staging area, to be committed later.
    pub fn append(&mut self, op: Operation) {
        self.staging.append(op);
    }

    /// Whether the bug has staged operations waiting for a commit.
    pub fn has_pending_ops(&self) -> bool {
        !self.staging.is_empty()
    }

    /// All operations in replay order: committed packs, then staging.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.packs
            .iter()
            .flat_map(|pack| pack.operations())
            .chain(self.staging.operations())
    }

    /// The very first operation of the bug. For a valid bug this is the
    /// Create operation.
    pub fn first_op(&self) -> Option<&Operation> {
        self.operations().next()
    }

    /// The most recent operation, staging included.
    pub fn last_op(&self) -> Option<&Operation> {
        self.staging
            .operations()
            .last()
            .or_else(|| self.packs.iter().rev().find_map(|p| p.operations().last()))
    }

    /// A bug is valid iff it has at least one operation, every pack
    /// (staging included) is valid, and exactly one Create operation exists,
    /// in first position.
    pub fn is_valid(&self) -> bool {
        if self.packs.is_empty() && self.staging.is_empty() {
            return false;
        }
        if !self.packs.iter().all(OperationPack::is_valid) {
            return false;
        }
        if !self.staging.is_empty() && !self.staging.is_valid() {
            return false;
        }
        match self.first_op() {
            Some(op) if op.kind() == OpKind::Create => {}
            _ => return false,
        }
        let creates = self
            .operations()
            .filter(|op| op.kind() == OpKind::Create)
            .count();
        creates == 1
    }

    /// Write the staging area to the store as one commit and advance the
    /// bug's ref.
    ///
    /// All-or-nothing at the ref update: a failure part-way leaves the
    /// in-memory bug unchanged, and already-written objects dangle
    /// harmlessly until the store reclaims them.
    pub fn commit(&mut self, store: &impl Store) -> Result<(), Error> {
        if self.staging.is_empty() {
            return Err(Error::EmptyStaging);
        }

        let pack_hash = store.store_blob(&self.staging.encode()?)?;
        let root_pack = self.root_pack.clone().unwrap_or_else(|| pack_hash.clone());

        let edit_time = store.increment_edit_clock()?;
        let create_time = match self.last_commit {
            None => Some(store.increment_create_clock()?),
            Some(_) => None,
        };

        let mut entries = vec![
            TreeEntry::blob(pack_hash.clone(), OPS_ENTRY),
            TreeEntry::blob(root_pack.clone(), ROOT_ENTRY),
        ];

        // Media blobs are referenced by the tree so the store can verify
        // they exist and carry them along with the history.
        let media = self.staging.referenced_media();
        if !media.is_empty() {
            let media_entries: Vec<TreeEntry> = media
                .into_iter()
                .enumerate()
                .map(|(i, file)| TreeEntry::blob(file, format!("file{i}")))
                .collect();
            let media_tree = store.store_tree(&media_entries)?;
            entries.push(TreeEntry::tree(media_tree, MEDIA_ENTRY));
        }

        // Clock values are serialized into entry names, all pointing at the
        // one empty blob, so no per-value blobs accumulate.
        let empty_blob = store.store_blob(&[])?;
        entries.push(TreeEntry::blob(
            empty_blob.clone(),
            format!("{EDIT_CLOCK_PREFIX}{edit_time}"),
        ));
        if let Some(create_time) = create_time {
            entries.push(TreeEntry::blob(
                empty_blob,
                format!("{CREATE_CLOCK_PREFIX}{create_time}"),
            ));
        }

        let tree = store.store_tree(&entries)?;

        let commit = match &self.last_commit {
            Some(parent) => store.store_commit_with_parent(&tree, parent)?,
            None => store.store_commit(&tree)?,
        };

        let id = self.id.clone().unwrap_or_else(|| commit.clone());
        store.update_ref(&format!("{BUGS_REF_PREFIX}{id}"), &commit)?;

        // The ref moved: the commit is now real, adopt it in memory.
        self.id = Some(id);
        self.root_pack = Some(root_pack);
        self.edit_time = edit_time;
        if let Some(create_time) = create_time {
            self.create_time = create_time;
        }
        self.last_commit = Some(commit.clone());

        let mut pack = mem::take(&mut self.staging);
        pack.set_commit(commit.clone());
        debug!(id = %self.id().short(), commit = %commit.short(), ops = pack.len(), "committed operation pack");
        self.packs.push(pack);

        Ok(())
    }

    /// Merge another replica of the same bug by adopting its new commits and
    /// rebasing the local divergent ones on top.
    ///
    /// Returns `false` when the other side brought nothing new. The other
    /// side's commits must already be present in the store (e.g. after a
    /// fetch); only the re-parented local commits are written.
    pub fn merge(&mut self, store: &impl Store, other: &Bug) -> Result<bool, Error> {
        // Precondition order matters: an unstored bug has no id yet, so
        // against a stored bug the identity comparison already rejects it.
        if self.id != other.id {
            return Err(Error::UnrelatedBugs);
        }
        if !other.staging.is_empty() {
            return Err(Error::OtherHasPendingOps);
        }
        // A bug gains its id and its head together on first commit, so past
        // the id comparison only a never-stored pair can lack a head.
        let (Some(id), Some(local_head), Some(other_head)) =
            (&self.id, &self.last_commit, &other.last_commit)
        else {
            return Err(Error::UnstoredBug);
        };

        let ancestor = store.find_common_ancestor(local_head, other_head)?;

        let ancestor_index = self
            .packs
            .iter()
            .position(|pack| pack.commit() == Some(&ancestor))
            .ok_or_else(|| Error::AncestorMissing(ancestor.clone()))?;

        if other.packs.len() == ancestor_index + 1 {
            // The other side has no commit we don't already have.
            return Ok(false);
        }

        let mut new_packs = self.packs[..=ancestor_index].to_vec();
        let mut head = ancestor;

        // Adopt the other side's packs verbatim; their commits are already
        // reachable in the store.
        for pack in &other.packs[ancestor_index + 1..] {
            new_packs.push(pack.clone());
            head = committed_hash(pack).clone();
        }
        let adopted = other.packs.len() - ancestor_index - 1;

        // Re-parent our divergent commits on the new head: same trees, new
        // parents. Operations are untouched.
        let rebased = self.packs.len() - ancestor_index - 1;
        for pack in &self.packs[ancestor_index + 1..] {
            let tree = store.tree_of_commit(committed_hash(pack))?;
            let commit = store.store_commit_with_parent(&tree, &head)?;
            new_packs.push(pack.clone_with_commit(commit.clone()));
            head = commit;
        }

        store.update_ref(&format!("{BUGS_REF_PREFIX}{id}"), &head)?;

        debug!(id = %id.short(), adopted, rebased, head = %head.short(), "merged bug");
        self.packs = new_packs;
        self.last_commit = Some(head);

        Ok(true)
    }

    /// Replay all operations into a snapshot.
    pub fn compile(&self) -> Snapshot {
        let mut snap = Snapshot {
            id: self.id.clone(),
            ..Snapshot::default()
        };
        for op in self.operations() {
            op.apply(&mut snap);
            snap.operations.push(op.clone());
        }
        snap
    }
}

/// Commit hash of a pack in committed history.
///
/// Packs only enter `Bug::packs` through `commit` or `read`, both of which
/// tag them; an untagged pack here is a broken internal invariant.
fn committed_hash(pack: &OperationPack) -> &ObjectId {
    match pack.commit() {
        Some(commit) => commit,
        None => unreachable!("packs in committed history carry their commit hash"),
    }
}

/// Read and parse a bug from the given ref.
pub(crate) fn read<S: Store + ?Sized>(store: &S, reference: &str) -> Result<Bug, Error> {
    let raw_id = reference.rsplit('/').next().unwrap_or(reference);
    let id = ObjectId::new(raw_id).map_err(|_| Error::InvalidRef {
        reference: reference.to_string(),
    })?;

    let commits = store.list_commits(reference)?;
    trace!(reference, commits = commits.len(), "reading bug");

    let mut bug = Bug {
        id: Some(id),
        ..Bug::default()
    };

    for commit in commits {
        let tree = store.tree_of_commit(&commit)?;
        let entries = store.list_tree_entries(&tree)?;

        let mut ops_entry = None;
        let mut root_entry = None;
        let mut create_time = None;
        let mut edit_time = None;

        for entry in &entries {
            if entry.name == OPS_ENTRY {
                if ops_entry.replace(entry).is_some() {
                    return Err(Error::invalid_tree(&commit, "duplicate ops entry"));
                }
            } else if entry.name == ROOT_ENTRY {
                if root_entry.replace(entry).is_some() {
                    return Err(Error::invalid_tree(&commit, "duplicate root entry"));
                }
            } else if let Some(raw) = entry.name.strip_prefix(CREATE_CLOCK_PREFIX) {
                let time = parse_clock(&commit, &entry.name, raw)?;
                if create_time.replace(time).is_some() {
                    return Err(Error::invalid_tree(&commit, "duplicate create-clock entry"));
                }
            } else if let Some(raw) = entry.name.strip_prefix(EDIT_CLOCK_PREFIX) {
                let time = parse_clock(&commit, &entry.name, raw)?;
                if edit_time.replace(time).is_some() {
                    return Err(Error::invalid_tree(&commit, "duplicate edit-clock entry"));
                }
            }
        }

        let ops_entry =
            ops_entry.ok_or_else(|| Error::invalid_tree(&commit, "missing the ops entry"))?;
        let root_entry =
            root_entry.ok_or_else(|| Error::invalid_tree(&commit, "missing the root entry"))?;

        if bug.root_pack.is_none() {
            // First commit of the chain: the identity anchor.
            bug.root_pack = Some(root_entry.id.clone());
            bug.create_time = create_time.unwrap_or_default();
        }
        if let Some(edit_time) = edit_time {
            // Older writers omitted the edit clock; keep the last seen value.
            bug.edit_time = edit_time;
        }

        store.witness_create(bug.create_time)?;
        store.witness_edit(bug.edit_time)?;

        let data = store.read_blob(&ops_entry.id)?;
        let mut pack =
            OperationPack::decode(&data).map_err(|err| Error::invalid_tree(&commit, err))?;
        pack.set_commit(commit.clone());
        bug.packs.push(pack);

        bug.last_commit = Some(commit);
    }

    Ok(bug)
}

fn parse_clock(commit: &ObjectId, name: &str, raw: &str) -> Result<LamportTime, Error> {
    raw.parse::<u64>().map(LamportTime).map_err(|_| {
        Error::invalid_tree(commit, format!("unparseable clock entry `{name}`"))
    })
}

/// Read a local bug by its full id.
pub fn read_local(store: &impl Store, id: &str) -> Result<Bug, Error> {
    read(store, &format!("{BUGS_REF_PREFIX}{id}"))
}

/// Read a bug from a remote-tracking ref.
pub fn read_remote(store: &impl Store, remote: &str, id: &str) -> Result<Bug, Error> {
    read(store, &format!("{}{id}", remote_bugs_ref_prefix(remote)))
}

/// Find the unique local bug whose id starts with `prefix`.
///
/// Matching is bytewise; no case folding. Zero matches is [`Error::NotFound`],
/// several are [`Error::Ambiguous`] with the full list.
pub fn find_local(store: &impl Store, prefix: &str) -> Result<Bug, Error> {
    let ids = store.list_ids(BUGS_REF_PREFIX)?;

    let mut matching: Vec<String> = ids.into_iter().filter(|id| id.starts_with(prefix)).collect();

    match matching.len() {
        0 => Err(Error::NotFound {
            prefix: prefix.to_string(),
        }),
        1 => read_local(store, &matching[0]),
        _ => {
            matching.sort();
            Err(Error::Ambiguous {
                prefix: prefix.to_string(),
                matches: matching,
            })
        }
    }
}

/// All local bug ids.
pub fn list_local_ids(store: &impl Store) -> Result<Vec<String>, Error> {
    Ok(store.list_ids(BUGS_REF_PREFIX)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::Author;
    use crate::core::operation::{AddCommentOp, CreateOp};
    use crate::core::snapshot::Status;

    fn author() -> Author {
        Author::new("alice").unwrap()
    }

    fn create_op(title: &str) -> Operation {
        Operation::Create(CreateOp {
            author: author(),
            unix_time: 1,
            title: title.to_string(),
            message: "body".to_string(),
            files: vec![],
        })
    }

    fn comment_op(message: &str) -> Operation {
        Operation::AddComment(AddCommentOp {
            author: author(),
            unix_time: 2,
            message: message.to_string(),
            files: vec![],
        })
    }

    #[test]
    fn empty_bug_is_invalid() {
        assert!(!Bug::new().is_valid());
    }

    #[test]
    fn staged_create_makes_a_valid_bug() {
        let mut bug = Bug::new();
        bug.append(create_op("foo"));
        assert!(bug.is_valid());
        assert!(bug.has_pending_ops());
    }

    #[test]
    fn create_must_come_first() {
        let mut bug = Bug::new();
        bug.append(comment_op("hi"));
        bug.append(create_op("foo"));
        assert!(!bug.is_valid());
    }

    #[test]
    fn a_second_create_invalidates() {
        let mut bug = Bug::new();
        bug.append(create_op("foo"));
        bug.append(create_op("bar"));
        assert!(!bug.is_valid());
    }

    #[test]
    fn first_and_last_op_span_packs_and_staging() {
        let mut bug = Bug::new();
        bug.append(create_op("foo"));
        bug.append(comment_op("hi"));
        assert_eq!(bug.first_op().map(Operation::kind), Some(OpKind::Create));
        assert_eq!(
            bug.last_op().map(Operation::kind),
            Some(OpKind::AddComment)
        );
    }

    #[test]
    #[should_panic(expected = "no id yet")]
    fn id_of_unstored_bug_panics() {
        Bug::new().id();
    }

    #[test]
    fn compile_replays_staging() {
        let mut bug = Bug::new();
        bug.append(create_op("foo"));
        bug.append(comment_op("hi"));
        let snap = bug.compile();
        assert_eq!(snap.title, "foo");
        assert_eq!(snap.status, Status::Open);
        assert_eq!(snap.comments.len(), 2);
        assert_eq!(snap.operations.len(), 2);
        assert!(snap.id().is_none());
    }
}
