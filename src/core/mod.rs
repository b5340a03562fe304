//! The domain core.
//!
//! Module hierarchy follows type dependency order:
//! - clock: Lamport time primitives
//! - identity: ObjectId, Author, Label
//! - snapshot: the materialized read-model
//! - operation: the event taxonomy and its replay
//! - pack: one commit's worth of operations, wire format included
//! - bug: the aggregate and the commit / read / merge protocols
//! - error: the bounded domain error enum

pub mod bug;
pub mod clock;
pub mod error;
pub mod identity;
pub mod operation;
pub mod pack;
pub mod snapshot;

pub use bug::{
    BUGS_REF_PREFIX, Bug, find_local, list_local_ids, read_local, read_remote,
    remote_bugs_ref_prefix,
};
pub use clock::{LamportClock, LamportTime};
pub use error::Error;
pub use identity::{
    Author, HUMAN_ID_LENGTH, ID_LENGTH, InvalidAuthor, InvalidLabel, InvalidObjectId, Label,
    ObjectId,
};
pub use operation::{
    AddCommentOp, ChangeLabelsOp, CreateOp, EditCommentOp, InvalidOpDigest, OpDecodeError,
    OpDigest, OpKind, Operation, SetMetadataOp, SetStatusOp, SetTitleOp,
};
pub use pack::{OperationPack, PackDecodeError, PackEncodeError, WIRE_VERSION};
pub use snapshot::{Comment, Snapshot, Status};
