//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes or text.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Input continues after a complete message.
    #[error("{remaining} trailing bytes after message")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },

    /// Invalid message structure.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// Unknown value type tag.
    #[error("unknown value type tag: {tag}")]
    UnknownTypeTag {
        /// The tag that was read.
        tag: String,
    },

    /// Invalid decimal literal or scale.
    #[error("invalid decimal: {message}")]
    InvalidDecimal {
        /// Description of the problem.
        message: String,
    },

    /// A length prefix exceeds the decoder's limits.
    #[error("length {length} exceeds limit {limit}")]
    LengthLimitExceeded {
        /// The declared length.
        length: u64,
        /// The maximum accepted length.
        limit: u64,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an unknown type tag error.
    pub fn unknown_tag(tag: impl Into<String>) -> Self {
        Self::UnknownTypeTag { tag: tag.into() }
    }

    /// Create an invalid decimal error.
    pub fn invalid_decimal(message: impl Into<String>) -> Self {
        Self::InvalidDecimal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::decoding_failed(err.to_string())
    }
}
