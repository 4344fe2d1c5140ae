//! Error types for the codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while parsing or serializing values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input is not valid JSON.
    #[error("invalid JSON: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },
}

impl CodecError {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}
