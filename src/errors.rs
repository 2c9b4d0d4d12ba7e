//! Failure kinds surfaced by the engine.
//!
//! Every fallible operation returns `anyhow::Result`; failures that callers
//! need to distinguish carry an [`EngineError`] at the root of the chain so
//! they can be recovered with `err.downcast_ref::<EngineError>()`.
//!
//! Merge conflicts are NOT an error: they are a normal
//! [`crate::artifacts::merge::merger::MergeOutcome`] with an empty commit
//! and a populated conflict list.

use crate::artifacts::objects::object_id::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The hash is absent from both loose storage and every loaded pack.
    #[error("object {0} not found in loose or packed storage")]
    ObjectNotFound(ObjectId),

    /// Bad magic, unsupported version, truncated entry or checksum mismatch
    /// in the staging index file.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// An object header declared a payload length that disagrees with the
    /// actual payload.
    #[error("object size mismatch: header declares {declared} bytes, payload has {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    /// The two commits being merged share no history.
    #[error("no common ancestor between {ours} and {theirs}")]
    NoCommonAncestor { ours: ObjectId, theirs: ObjectId },

    /// Deletion guard: the branch tip is not an ancestor of HEAD.
    #[error("branch '{0}' is not fully merged")]
    BranchNotFullyMerged(String),

    #[error("branch '{0}' already exists")]
    BranchAlreadyExists(String),

    /// The operation needs a HEAD commit and none exists yet.
    #[error("no commits yet")]
    NoCommitsYet,

    /// Filesystem errors, wrapped uniformly.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}
