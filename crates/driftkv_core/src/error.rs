//! Error types for the core engine.

use driftkv_storage::Hash;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Chunk store error.
    #[error("storage error: {0}")]
    Storage(#[from] driftkv_storage::StorageError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] driftkv_codec::CodecError),

    /// Patch application error.
    #[error(transparent)]
    Patch(#[from] crate::patch::PatchError),

    /// A referenced commit does not exist in the store.
    #[error("commit {0} not found")]
    CommitNotFound(Hash),

    /// A stored commit violates the structural invariants.
    #[error("corrupt commit: {message}")]
    CorruptCommit {
        /// Description of the violation.
        message: String,
    },

    /// Fast-forward failed because the head moved past the commit's basis.
    #[error("merge needed")]
    MergeNeeded,

    /// Operation on a closed transaction.
    #[error("Transaction is closed")]
    TransactionClosed,

    /// Replay parameters do not match the original commit.
    #[error("{message}")]
    InvalidReplay {
        /// Description of the mismatch.
        message: String,
    },

    /// Invalid argument provided by the caller.
    #[error("{message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },
}

impl CoreError {
    /// Creates a corrupt commit error.
    pub fn corrupt_commit(message: impl Into<String>) -> Self {
        Self::CorruptCommit {
            message: message.into(),
        }
    }

    /// Creates an invalid replay error.
    pub fn invalid_replay(message: impl Into<String>) -> Self {
        Self::InvalidReplay {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
