//! Operation packs.
//!
//! A pack is one commit's worth of operations, serialized atomically into a
//! single blob. While a pack is the staging area it has no commit identity;
//! once committed (or parsed back out of the store) it is tagged with the
//! hash of the commit that carries it.
//!
//! Wire format: a versioned JSON container, `{"version": 1, "ops": [...]}`,
//! each element a self-contained tagged record. Field names are stable
//! across versions; unknown version numbers and unknown operation tags are
//! rejected, never skipped.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::identity::ObjectId;
use super::operation::{OpDecodeError, Operation};

/// Current pack container version.
pub const WIRE_VERSION: u32 = 1;

#[derive(Debug, Error)]
#[error("failed to encode operation pack: {0}")]
pub struct PackEncodeError(#[from] serde_json::Error);

#[derive(Debug, Error)]
pub enum PackDecodeError {
    #[error("operation pack is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported operation pack version {got} (supported: {WIRE_VERSION})")]
    UnsupportedVersion { got: u32 },
    #[error(transparent)]
    Op(#[from] OpDecodeError),
}

#[derive(Serialize, Deserialize)]
struct PackWire {
    version: u32,
    ops: Vec<serde_json::Value>,
}

/// An ordered batch of operations plus the identity of the commit that
/// stores it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationPack {
    ops: Vec<Operation>,
    commit: Option<ObjectId>,
}

impl OperationPack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Hash of the commit carrying this pack; `None` while staging.
    pub fn commit(&self) -> Option<&ObjectId> {
        self.commit.as_ref()
    }

    pub(crate) fn set_commit(&mut self, commit: ObjectId) {
        self.commit = Some(commit);
    }

    /// Deep copy re-tagged with a new commit, used when a merge re-parents
    /// this pack's commit.
    pub fn clone_with_commit(&self, commit: ObjectId) -> Self {
        Self {
            ops: self.ops.clone(),
            commit: Some(commit),
        }
    }

    /// A pack is valid when it carries at least one operation and each
    /// operation is individually valid.
    pub fn is_valid(&self) -> bool {
        !self.ops.is_empty() && self.ops.iter().all(Operation::is_valid)
    }

    /// Distinct media hashes referenced by this pack's operations, in first
    /// appearance order.
    pub fn referenced_media(&self) -> Vec<ObjectId> {
        let mut seen = BTreeSet::new();
        let mut media = Vec::new();
        for op in &self.ops {
            for file in op.files() {
                if seen.insert(file.clone()) {
                    media.push(file.clone());
                }
            }
        }
        media
    }

    /// Serialize into the stable wire container.
    pub fn encode(&self) -> Result<Vec<u8>, PackEncodeError> {
        let wire = PackWire {
            version: WIRE_VERSION,
            ops: self.ops.iter().map(Operation::to_wire).collect(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Parse a pack blob. The result is untagged; the reader tags it with
    /// the hash of the commit it came from.
    pub fn decode(data: &[u8]) -> Result<Self, PackDecodeError> {
        let wire: PackWire = serde_json::from_slice(data)?;
        if wire.version != WIRE_VERSION {
            return Err(PackDecodeError::UnsupportedVersion { got: wire.version });
        }
        let ops = wire
            .ops
            .into_iter()
            .map(Operation::from_wire)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ops, commit: None })
    }
}
