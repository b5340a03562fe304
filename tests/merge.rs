//! Reconciling divergent replicas of the same bug: adoption of remote
//! packs, rebase of local divergence, idempotence and convergence.

mod fixtures;

use burr::{Bug, Error, MemoryStore, OpKind, Store, read_local};
use fixtures::{comment, create};

/// One committed bug plus two replicas read back from the store, ready to
/// diverge.
fn diverged(store: &MemoryStore) -> (Bug, Bug) {
    let mut bug = Bug::new();
    bug.append(create("alice", 1, "foo"));
    bug.commit(store).unwrap();

    let mut left = read_local(store, bug.id().as_str()).unwrap();
    let mut right = read_local(store, bug.id().as_str()).unwrap();

    left.append(comment("alice", 2, "x"));
    left.commit(store).unwrap();
    right.append(comment("bob", 3, "y"));
    right.commit(store).unwrap();

    (left, right)
}

#[test]
fn divergent_histories_rebase_local_commits_on_the_adopted_head() {
    let store = MemoryStore::new();
    let (mut left, right) = diverged(&store);
    let local_divergent = left.packs()[1].clone();

    let updated = left.merge(&store, &right).unwrap();
    assert!(updated);

    // [create, y, x'] where x' carries x's operations under a new commit.
    assert_eq!(left.packs().len(), 3);
    assert_eq!(left.packs()[1], right.packs()[1]);
    assert_eq!(
        left.packs()[2].operations(),
        local_divergent.operations()
    );
    assert_ne!(left.packs()[2].commit(), local_divergent.commit());
    assert_eq!(left.last_commit(), left.packs()[2].commit());

    // The rebased commit reuses the original tree and parents the adopted
    // head.
    let rebased = left.packs()[2].commit().unwrap();
    let original = local_divergent.commit().unwrap();
    assert_eq!(
        store.tree_of_commit(rebased).unwrap(),
        store.tree_of_commit(original).unwrap()
    );
    let chain = store
        .list_commits(&format!("refs/bugs/{}", left.id()))
        .unwrap();
    assert_eq!(chain.len(), 3);
    assert_eq!(&chain[1], right.packs()[1].commit().unwrap());
    assert_eq!(&chain[2], rebased);

    assert!(left.is_valid());
    let snap = left.compile();
    let messages: Vec<&str> = snap.comments.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages, vec!["foo needs fixing", "y", "x"]);
}

#[test]
fn merge_with_an_ancestor_is_a_no_op() {
    let store = MemoryStore::new();

    let mut bug = Bug::new();
    bug.append(create("alice", 1, "foo"));
    bug.commit(&store).unwrap();

    let stale = read_local(&store, bug.id().as_str()).unwrap();

    bug.append(comment("alice", 2, "more"));
    bug.commit(&store).unwrap();
    let head_before = bug.last_commit().cloned();

    let updated = bug.merge(&store, &stale).unwrap();
    assert!(!updated);
    assert_eq!(bug.last_commit().cloned(), head_before);
    assert_eq!(bug.packs().len(), 2);

    // No ref write happened: the store still points at the same head.
    let chain = store
        .list_commits(&format!("refs/bugs/{}", bug.id()))
        .unwrap();
    assert_eq!(chain.last(), head_before.as_ref());
}

#[test]
fn merge_is_idempotent() {
    let store = MemoryStore::new();
    let (mut left, right) = diverged(&store);

    assert!(left.merge(&store, &right).unwrap());
    assert!(!left.merge(&store, &right).unwrap());
    assert_eq!(left.packs().len(), 3);
}

#[test]
fn merging_both_ways_converges_to_the_same_snapshot() {
    let store = MemoryStore::new();
    let (mut left, mut right) = diverged(&store);

    assert!(left.merge(&store, &right).unwrap());
    assert!(right.merge(&store, &left).unwrap());

    assert_eq!(left.packs().len(), right.packs().len());
    assert_eq!(left.last_commit(), right.last_commit());
    assert_eq!(left.compile(), right.compile());
}

#[test]
fn identity_and_root_survive_commits_and_merges() {
    let store = MemoryStore::new();
    let (mut left, right) = diverged(&store);

    let id = left.id().clone();
    let root_pack = left.root_pack().cloned();
    let root_commit = left.packs()[0].commit().cloned();

    left.merge(&store, &right).unwrap();
    left.append(comment("alice", 9, "after merge"));
    left.commit(&store).unwrap();

    assert_eq!(left.id(), &id);
    assert_eq!(left.root_commit(), Some(&id));
    assert_eq!(left.root_pack().cloned(), root_pack);
    assert_eq!(left.packs()[0].commit().cloned(), root_commit);
}

#[test]
fn merge_preconditions_each_fail_with_a_dedicated_error() {
    let store = MemoryStore::new();

    // Unrelated bugs.
    let mut a = Bug::new();
    a.append(create("alice", 1, "foo"));
    a.commit(&store).unwrap();
    let mut b = Bug::new();
    b.append(create("bob", 2, "bar"));
    b.commit(&store).unwrap();
    assert!(matches!(
        a.merge(&store, &b),
        Err(Error::UnrelatedBugs)
    ));

    // Other side still has staged operations.
    let mut dirty = read_local(&store, a.id().as_str()).unwrap();
    dirty.append(comment("carol", 3, "pending"));
    assert!(matches!(
        a.merge(&store, &dirty),
        Err(Error::OtherHasPendingOps)
    ));

    // A never-stored bug has no id yet, so against a stored bug the
    // identity comparison fires first.
    let mut unstored = Bug::new();
    unstored.append(create("dave", 4, "baz"));
    assert!(matches!(
        unstored.merge(&store, &a),
        Err(Error::UnrelatedBugs)
    ));
    assert!(matches!(
        a.merge(&store, &unstored),
        Err(Error::UnrelatedBugs)
    ));

    // Two never-stored bugs compare as identical and fail on the missing
    // history instead.
    assert!(matches!(
        unstored.merge(&store, &Bug::new()),
        Err(Error::UnstoredBug)
    ));
}

#[test]
fn replayed_merge_keeps_exactly_one_create() {
    let store = MemoryStore::new();
    let (mut left, right) = diverged(&store);
    left.merge(&store, &right).unwrap();

    let creates = left
        .compile()
        .operations
        .iter()
        .filter(|op| op.kind() == OpKind::Create)
        .count();
    assert_eq!(creates, 1);
    assert!(left.is_valid());
}
