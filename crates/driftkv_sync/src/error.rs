//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Push-phase failures are deliberately absent: they are captured in
/// [`crate::BatchPushInfo`] and never abort a sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Engine error while reading or writing the commit graph.
    #[error("sync failed: {0}")]
    Core(#[from] driftkv_core::CoreError),

    /// A sync is already running on this connection.
    #[error("There is already a sync in progress")]
    SyncInProgress,

    /// The pull request could not be sent or the response not received.
    #[error("pull transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The diff server answered with a non-200 status.
    #[error("pull failed: {status}: {body}")]
    PullStatus {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The pull response could not be interpreted.
    #[error("invalid pull response: {message}")]
    InvalidResponse {
        /// Description of the problem.
        message: String,
    },

    /// The client view went backwards in mutation IDs.
    #[error("client view lastMutationID {got} is < previous lastMutationID {expected}; ignoring")]
    MutationIdRegression {
        /// The lastMutationID from the pull response.
        got: u64,
        /// The base snapshot's lastMutationID.
        expected: u64,
    },

    /// The patched keyspace does not hash to the checksum the server sent.
    #[error("checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch {
        /// The server-sent checksum.
        expected: String,
        /// The locally computed checksum.
        got: String,
    },

    /// The server-sent patch could not be applied to the base snapshot.
    #[error("couldn't apply patch: {0}")]
    PatchFailed(#[from] driftkv_core::PatchError),

    /// Another sync landed a snapshot on master since this one started.
    #[error("sync aborted: found a newer snapshot {head_snapshot} on master")]
    NewerSnapshot {
        /// Hash of the snapshot now at the base of master.
        head_snapshot: driftkv_storage::Hash,
    },
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}
