//! Domain errors.
//!
//! These are bounded and stable: they represent refusal states of the data
//! model, not library implementation details. Store failures pass through
//! unchanged. The one contract violation that is *not* an error is asking a
//! never-committed bug for its id, which panics (see [`Bug::id`]).
//!
//! [`Bug::id`]: super::bug::Bug::id

use thiserror::Error;

use super::identity::ObjectId;
use super::pack::PackEncodeError;
use crate::store::StoreError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No bug id matches the given prefix.
    #[error("no bug matches prefix `{prefix}`")]
    NotFound { prefix: String },

    /// More than one bug id matches the given prefix.
    #[error("multiple bugs match prefix `{prefix}`: {}", .matches.join(", "))]
    Ambiguous {
        prefix: String,
        matches: Vec<String>,
    },

    /// A ref whose terminal component is not a well-formed bug id.
    #[error("ref `{reference}` does not end in a 40-character hex id")]
    InvalidRef { reference: String },

    /// A commit tree that does not follow the pack layout: missing `ops` or
    /// `root` entry, duplicate or unparseable clock entries, or a pack blob
    /// that does not decode.
    #[error("invalid tree in commit {commit}: {reason}")]
    InvalidTree { commit: ObjectId, reason: String },

    /// Commit called with nothing staged.
    #[error("can't commit a bug with no pending operation")]
    EmptyStaging,

    /// Merge called on bugs with different identities.
    #[error("merging unrelated bugs is not supported")]
    UnrelatedBugs,

    /// Merge called while the other replica still has staged operations.
    #[error("merging a bug with a non-empty staging is not supported")]
    OtherHasPendingOps,

    /// Merge called on bugs with no commit history. An unstored bug also
    /// has no id, so against a stored one the identity check rejects it
    /// first.
    #[error("can't merge a bug that has never been stored")]
    UnstoredBug,

    /// The reported common ancestor is not part of the local pack chain;
    /// the two histories do not actually share this bug's root.
    #[error("common ancestor {0} is not part of the local history")]
    AncestorMissing(ObjectId),

    /// The staging pack failed to serialize.
    #[error(transparent)]
    Pack(#[from] PackEncodeError),

    /// Pass-through failure from the store contract.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub(crate) fn invalid_tree(commit: &ObjectId, reason: impl ToString) -> Self {
        Error::InvalidTree {
            commit: commit.clone(),
            reason: reason.to_string(),
        }
    }
}
