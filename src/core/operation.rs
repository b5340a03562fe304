//! The operation taxonomy.
//!
//! Every mutation of a bug is one of these events. Operations are appended
//! to a staging area, committed in packs, and replayed in order to build a
//! [`Snapshot`]. They are designed so that replaying a merged history is
//! order-insensitive in practice: comments append, labels are set-valued,
//! metadata is first-write-wins.
//!
//! Each operation has a stable digest (sha256 over its canonical wire
//! encoding) used as its address: EditComment and SetMetadata target the
//! digest of an earlier operation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::identity::{Author, Label, ObjectId};
use super::snapshot::{Comment, Snapshot, Status};

/// Operation discriminant, also the wire type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpKind {
    Create,
    SetTitle,
    AddComment,
    EditComment,
    SetStatus,
    ChangeLabels,
    SetMetadata,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::SetTitle => "set_title",
            OpKind::AddComment => "add_comment",
            OpKind::EditComment => "edit_comment",
            OpKind::SetStatus => "set_status",
            OpKind::ChangeLabels => "change_labels",
            OpKind::SetMetadata => "set_metadata",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "create" => Some(OpKind::Create),
            "set_title" => Some(OpKind::SetTitle),
            "add_comment" => Some(OpKind::AddComment),
            "edit_comment" => Some(OpKind::EditComment),
            "set_status" => Some(OpKind::SetStatus),
            "change_labels" => Some(OpKind::ChangeLabels),
            "set_metadata" => Some(OpKind::SetMetadata),
            _ => None,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable address of an operation: sha256 over its canonical wire form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpDigest([u8; 32]);

impl OpDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        let mut out = String::with_capacity(64);
        for b in self.0 {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    pub fn parse_hex(s: &str) -> Result<Self, InvalidOpDigest> {
        if s.len() != 64 {
            return Err(InvalidOpDigest { raw: s.to_string() });
        }
        let mut buf = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_nibble(chunk[0]).ok_or_else(|| InvalidOpDigest { raw: s.to_string() })?;
            let lo = hex_nibble(chunk[1]).ok_or_else(|| InvalidOpDigest { raw: s.to_string() })?;
            buf[i] = (hi << 4) | lo;
        }
        Ok(Self(buf))
    }
}

fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("operation digest `{raw}` is not 64 lowercase hex characters")]
pub struct InvalidOpDigest {
    pub raw: String,
}

impl fmt::Debug for OpDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpDigest({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for OpDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for OpDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for OpDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OpDigest::parse_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Failed decode of a single operation out of a pack.
#[derive(Debug, Error)]
pub enum OpDecodeError {
    #[error("operation is not a JSON object")]
    NotAnObject,
    #[error("operation has no `type` tag")]
    MissingType,
    #[error("unknown operation type tag `{tag}`")]
    UnknownType { tag: String },
    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: OpKind,
        #[source]
        source: serde_json::Error,
    },
}

// Payload structs. `author` and `unix_time` repeat in each variant on the
// wire so a pack stays a flat array of self-contained records.

/// Opens the bug: title, first comment, status Open. Must be the very first
/// operation of a bug, exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOp {
    pub author: Author,
    pub unix_time: i64,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ObjectId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTitleOp {
    pub author: Author,
    pub unix_time: i64,
    pub title: String,
    /// The title being replaced, kept for display of the edit trail.
    pub was: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCommentOp {
    pub author: Author,
    pub unix_time: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ObjectId>,
}

/// Rewrites the body of an earlier comment, addressed by the digest of the
/// operation that produced it. A dangling target applies as a no-op.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditCommentOp {
    pub author: Author,
    pub unix_time: i64,
    pub target: OpDigest,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ObjectId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStatusOp {
    pub author: Author,
    pub unix_time: i64,
    pub status: Status,
}

/// Set-valued label update; adding an existing label or removing an absent
/// one is a no-op, which keeps replay order-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLabelsOp {
    pub author: Author,
    pub unix_time: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<Label>,
}

/// Attaches metadata entries to an earlier comment-producing operation.
/// First write per key wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMetadataOp {
    pub author: Author,
    pub unix_time: i64,
    pub target: OpDigest,
    pub entries: BTreeMap<String, String>,
}

/// One event in a bug's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Create(CreateOp),
    SetTitle(SetTitleOp),
    AddComment(AddCommentOp),
    EditComment(EditCommentOp),
    SetStatus(SetStatusOp),
    ChangeLabels(ChangeLabelsOp),
    SetMetadata(SetMetadataOp),
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Create(_) => OpKind::Create,
            Operation::SetTitle(_) => OpKind::SetTitle,
            Operation::AddComment(_) => OpKind::AddComment,
            Operation::EditComment(_) => OpKind::EditComment,
            Operation::SetStatus(_) => OpKind::SetStatus,
            Operation::ChangeLabels(_) => OpKind::ChangeLabels,
            Operation::SetMetadata(_) => OpKind::SetMetadata,
        }
    }

    pub fn author(&self) -> &Author {
        match self {
            Operation::Create(op) => &op.author,
            Operation::SetTitle(op) => &op.author,
            Operation::AddComment(op) => &op.author,
            Operation::EditComment(op) => &op.author,
            Operation::SetStatus(op) => &op.author,
            Operation::ChangeLabels(op) => &op.author,
            Operation::SetMetadata(op) => &op.author,
        }
    }

    pub fn unix_time(&self) -> i64 {
        match self {
            Operation::Create(op) => op.unix_time,
            Operation::SetTitle(op) => op.unix_time,
            Operation::AddComment(op) => op.unix_time,
            Operation::EditComment(op) => op.unix_time,
            Operation::SetStatus(op) => op.unix_time,
            Operation::ChangeLabels(op) => op.unix_time,
            Operation::SetMetadata(op) => op.unix_time,
        }
    }

    /// Content hashes of the media this operation references. The commit
    /// protocol anchors them in the pack's media subtree so a store can
    /// fetch and retain them alongside the history.
    pub fn files(&self) -> &[ObjectId] {
        match self {
            Operation::Create(op) => &op.files,
            Operation::AddComment(op) => &op.files,
            Operation::EditComment(op) => &op.files,
            _ => &[],
        }
    }

    /// A structurally empty operation would replay as a visible no-op;
    /// packs refuse to carry one.
    pub fn is_valid(&self) -> bool {
        match self {
            Operation::Create(op) => !op.title.trim().is_empty(),
            Operation::SetTitle(op) => !op.title.trim().is_empty(),
            Operation::AddComment(op) => !op.message.trim().is_empty(),
            Operation::EditComment(op) => !op.message.trim().is_empty(),
            Operation::SetStatus(_) => true,
            Operation::ChangeLabels(op) => !(op.added.is_empty() && op.removed.is_empty()),
            Operation::SetMetadata(op) => !op.entries.is_empty(),
        }
    }

    /// Replay this operation into the snapshot.
    pub fn apply(&self, snap: &mut Snapshot) {
        let time = self.unix_time();
        snap.created_unix.get_or_insert(time);
        snap.edited_unix = Some(time);

        match self {
            Operation::Create(op) => {
                snap.title = op.title.clone();
                snap.status = Status::Open;
                snap.comments.push(Comment {
                    id: self.digest(),
                    author: op.author.clone(),
                    message: op.message.clone(),
                    files: op.files.clone(),
                    unix_time: op.unix_time,
                    metadata: BTreeMap::new(),
                });
            }
            Operation::SetTitle(op) => {
                snap.title = op.title.clone();
            }
            Operation::AddComment(op) => {
                snap.comments.push(Comment {
                    id: self.digest(),
                    author: op.author.clone(),
                    message: op.message.clone(),
                    files: op.files.clone(),
                    unix_time: op.unix_time,
                    metadata: BTreeMap::new(),
                });
            }
            Operation::EditComment(op) => {
                if let Some(comment) = snap.comment_mut(&op.target) {
                    comment.message = op.message.clone();
                    comment.files = op.files.clone();
                }
            }
            Operation::SetStatus(op) => {
                snap.status = op.status;
            }
            Operation::ChangeLabels(op) => {
                for label in &op.added {
                    snap.labels.insert(label.clone());
                }
                for label in &op.removed {
                    snap.labels.remove(label);
                }
            }
            Operation::SetMetadata(op) => {
                if let Some(comment) = snap.comment_mut(&op.target) {
                    for (key, value) in &op.entries {
                        comment
                            .metadata
                            .entry(key.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
        }
    }

    /// Stable content address of this operation: sha256 over its canonical
    /// wire encoding. The wire value is the single source of truth, so a
    /// payload change cannot silently leave the digest behind; JSON object
    /// keys are ordered, so the bytes are deterministic.
    pub fn digest(&self) -> OpDigest {
        let bytes = match serde_json::to_vec(&self.to_wire()) {
            Ok(bytes) => bytes,
            Err(_) => unreachable!("wire values are plain JSON"),
        };
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let out = hasher.finalize();
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&out);
        OpDigest(buf)
    }

    /// Wire form: the payload object with a `type` tag merged in.
    ///
    /// Infallible: payloads are plain structs of strings, integers and
    /// string-keyed maps, which always serialize to a JSON object.
    pub(crate) fn to_wire(&self) -> serde_json::Value {
        let value = match self {
            Operation::Create(op) => serde_json::to_value(op),
            Operation::SetTitle(op) => serde_json::to_value(op),
            Operation::AddComment(op) => serde_json::to_value(op),
            Operation::EditComment(op) => serde_json::to_value(op),
            Operation::SetStatus(op) => serde_json::to_value(op),
            Operation::ChangeLabels(op) => serde_json::to_value(op),
            Operation::SetMetadata(op) => serde_json::to_value(op),
        };
        let Ok(serde_json::Value::Object(mut obj)) = value else {
            unreachable!("operation payloads serialize to objects")
        };
        obj.insert(
            "type".to_string(),
            serde_json::Value::String(self.kind().as_str().to_string()),
        );
        serde_json::Value::Object(obj)
    }

    /// Decode a single wire record. Unknown type tags are rejected
    /// explicitly rather than skipped: an unknown tag means the pack was
    /// written by a newer writer and silently dropping it would corrupt the
    /// replay.
    pub(crate) fn from_wire(value: serde_json::Value) -> Result<Self, OpDecodeError> {
        let mut obj = match value {
            serde_json::Value::Object(obj) => obj,
            _ => return Err(OpDecodeError::NotAnObject),
        };
        let tag = match obj.remove("type") {
            Some(serde_json::Value::String(tag)) => tag,
            _ => return Err(OpDecodeError::MissingType),
        };
        let kind = OpKind::parse(&tag).ok_or(OpDecodeError::UnknownType { tag })?;
        let payload = serde_json::Value::Object(obj);
        let wrap = |source| OpDecodeError::Payload { kind, source };
        Ok(match kind {
            OpKind::Create => Operation::Create(serde_json::from_value(payload).map_err(wrap)?),
            OpKind::SetTitle => {
                Operation::SetTitle(serde_json::from_value(payload).map_err(wrap)?)
            }
            OpKind::AddComment => {
                Operation::AddComment(serde_json::from_value(payload).map_err(wrap)?)
            }
            OpKind::EditComment => {
                Operation::EditComment(serde_json::from_value(payload).map_err(wrap)?)
            }
            OpKind::SetStatus => {
                Operation::SetStatus(serde_json::from_value(payload).map_err(wrap)?)
            }
            OpKind::ChangeLabels => {
                Operation::ChangeLabels(serde_json::from_value(payload).map_err(wrap)?)
            }
            OpKind::SetMetadata => {
                Operation::SetMetadata(serde_json::from_value(payload).map_err(wrap)?)
            }
        })
    }
}
