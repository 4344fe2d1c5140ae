//! Error types for chunk storage.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in chunk store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A hash string could not be parsed.
    #[error("Invalid hash: {input}")]
    InvalidHash {
        /// The string that failed to parse.
        input: String,
    },

    /// Another process holds the database lock.
    #[error("database locked: another process has exclusive access")]
    Locked,

    /// A stored chunk does not match its address.
    #[error("chunk corruption: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },
}

impl StorageError {
    /// Creates an invalid hash error.
    pub fn invalid_hash(input: impl Into<String>) -> Self {
        Self::InvalidHash {
            input: input.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}
