//! Error type surfaced to hosts.

use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned from [`crate::dispatch`].
///
/// The display strings of several variants are part of the host-visible
/// contract and must not change.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Engine error.
    #[error("{0}")]
    Core(#[from] driftkv_core::CoreError),

    /// Sync error.
    #[error("{0}")]
    Sync(#[from] driftkv_sync::SyncError),

    /// Storage error.
    #[error("{0}")]
    Storage(#[from] driftkv_storage::StorageError),

    /// A request body failed to parse.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// A transaction operation arrived without a transaction ID.
    #[error("Missing transaction ID")]
    MissingTransactionId,

    /// A transaction operation named an ID that is not in the table.
    #[error("Invalid transaction ID: {0}")]
    UnknownTransactionId(u64),

    /// The named database has not been opened.
    #[error("specified database is not open")]
    DatabaseNotOpen,

    /// The registry has not been initialized.
    #[error("must call init first")]
    Uninitialized,

    /// A lifecycle call named no database.
    #[error("dbName must be non-empty")]
    EmptyDbName,

    /// The rpc name is not recognized.
    #[error("unsupported rpc name: {0}")]
    UnsupportedRpc(String),

    /// An argument failed validation.
    #[error("{message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A handler panicked; the panic was contained by the dispatch frame.
    #[error("dispatch panicked with: {message}")]
    Panicked {
        /// The panic payload, best-effort stringified.
        message: String,
    },
}

impl ApiError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_error_strings() {
        assert_eq!(
            ApiError::MissingTransactionId.to_string(),
            "Missing transaction ID"
        );
        assert_eq!(
            ApiError::UnknownTransactionId(7).to_string(),
            "Invalid transaction ID: 7"
        );
        assert_eq!(
            ApiError::DatabaseNotOpen.to_string(),
            "specified database is not open"
        );
        assert_eq!(ApiError::Uninitialized.to_string(), "must call init first");
        assert_eq!(ApiError::EmptyDbName.to_string(), "dbName must be non-empty");
    }
}
