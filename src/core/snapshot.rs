//! The materialized view of a bug.
//!
//! A snapshot is a pure function of the operation replay: nothing here is
//! ever stored, and two replicas replaying the same operation set always
//! materialize the same snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::identity::{Author, Label, ObjectId};
use super::operation::{OpDigest, Operation};

/// Workflow status of a bug.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Open,
    Closed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::Closed => "closed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One comment in the thread. The first comment is the bug description,
/// written by the Create operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    /// Digest of the operation that created this comment; the address used
    /// by EditComment and SetMetadata.
    pub id: OpDigest,
    pub author: Author,
    pub message: String,
    /// Media referenced by the comment body.
    pub files: Vec<ObjectId>,
    pub unix_time: i64,
    /// Metadata attached to the producing operation, first write per key wins.
    pub metadata: BTreeMap<String, String>,
}

/// Read-model produced by replaying all operations of a bug, oldest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub(crate) id: Option<ObjectId>,
    pub title: String,
    pub status: Status,
    pub comments: Vec<Comment>,
    pub labels: BTreeSet<Label>,
    pub(crate) created_unix: Option<i64>,
    pub(crate) edited_unix: Option<i64>,
    /// The replayed operation trail, in apply order.
    pub operations: Vec<Operation>,
}

impl Snapshot {
    /// The bug's identity. `None` until the bug has been committed once.
    pub fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    /// Bug-level metadata: the entries attached to the Create operation.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        self.comments.first().map(|c| &c.metadata).unwrap_or(&EMPTY)
    }

    /// Wall time of the first operation.
    pub fn create_unix_time(&self) -> Option<i64> {
        self.created_unix
    }

    /// Wall time of the most recent operation.
    pub fn edit_unix_time(&self) -> Option<i64> {
        self.edited_unix
    }

    pub(crate) fn comment_mut(&mut self, target: &OpDigest) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| c.id == *target)
    }
}
