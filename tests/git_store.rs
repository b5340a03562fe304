//! The same protocol, exercised against a real git repository.

mod fixtures;

use std::collections::BTreeSet;
use std::sync::Arc;

use burr::{Bug, GitStore, Status, Store, find_local, read_all_local, read_local};
use fixtures::{comment, comment_with_files, create};

fn temp_store() -> (tempfile::TempDir, GitStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = GitStore::init(dir.path()).unwrap();
    (dir, store)
}

#[test]
fn first_commit_tree_layout_in_git() {
    let (_dir, store) = temp_store();
    let mut bug = Bug::new();
    bug.append(create("alice", 1, "foo"));
    bug.commit(&store).unwrap();

    let commits = store
        .list_commits(&format!("refs/bugs/{}", bug.id()))
        .unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(&commits[0], bug.id());

    let tree = store.tree_of_commit(&commits[0]).unwrap();
    let names: BTreeSet<String> = store
        .list_tree_entries(&tree)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    let expected: BTreeSet<String> = ["ops", "root", "edit-clock-1", "create-clock-1"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names, expected);
}

#[test]
fn round_trip_through_a_real_repository() {
    let (_dir, store) = temp_store();
    let mut bug = Bug::new();
    bug.append(create("alice", 1, "foo"));
    bug.commit(&store).unwrap();

    // Media must exist in the object database before a tree can point at it.
    let shot = store.store_blob(b"\x89PNG...").unwrap();
    bug.append(comment_with_files("bob", 2, "see attached", vec![shot.clone()]));
    bug.commit(&store).unwrap();

    let read = read_local(&store, bug.id().as_str()).unwrap();
    assert!(read.is_valid());
    assert_eq!(read.packs().len(), 2);
    assert_eq!(read.compile(), bug.compile());
    assert_eq!(read.compile().comments[1].files, vec![shot]);
    assert_eq!(read.compile().status, Status::Open);
}

#[test]
fn divergent_replicas_merge_in_git() {
    let (_dir, store) = temp_store();
    let mut bug = Bug::new();
    bug.append(create("alice", 1, "foo"));
    bug.commit(&store).unwrap();

    let mut left = read_local(&store, bug.id().as_str()).unwrap();
    let mut right = read_local(&store, bug.id().as_str()).unwrap();
    left.append(comment("alice", 2, "x"));
    left.commit(&store).unwrap();
    right.append(comment("bob", 3, "y"));
    right.commit(&store).unwrap();

    let original = left.packs()[1].commit().cloned().unwrap();
    assert!(left.merge(&store, &right).unwrap());

    assert_eq!(left.packs().len(), 3);
    let rebased = left.packs()[2].commit().cloned().unwrap();
    assert_ne!(rebased, original);
    // Rebase re-parents, it does not rewrite trees.
    assert_eq!(
        store.tree_of_commit(&rebased).unwrap(),
        store.tree_of_commit(&original).unwrap()
    );

    let chain = store
        .list_commits(&format!("refs/bugs/{}", left.id()))
        .unwrap();
    assert_eq!(chain.last(), left.last_commit());

    assert!(!left.merge(&store, &right).unwrap());
}

#[test]
fn lookup_and_streaming_over_git_refs() {
    let (_dir, store) = temp_store();
    let mut first = Bug::new();
    first.append(create("alice", 1, "foo"));
    first.commit(&store).unwrap();
    let mut second = Bug::new();
    second.append(create("bob", 2, "bar"));
    second.commit(&store).unwrap();

    let found = find_local(&store, first.id().as_str()).unwrap();
    assert_eq!(found.id(), first.id());

    let store = Arc::new(store);
    let seen: BTreeSet<String> = read_all_local(store)
        .map(|item| item.unwrap().id().to_string())
        .collect();
    let expected: BTreeSet<String> = [first.id().to_string(), second.id().to_string()]
        .into_iter()
        .collect();
    assert_eq!(seen, expected);
}
