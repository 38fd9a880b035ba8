//! Error types for BSON encoding and decoding operations.

use std::fmt::Display;

use thiserror::Error;

use crate::types::ElementType;

/// Errors that can occur while encoding or decoding BSON.
#[derive(Error, Debug)]
pub enum BsonError {
    /// The native backend expected one kind of element in its storage and found another.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: ElementType,
        found: ElementType,
    },

    /// Trial decoding exhausted every candidate kind without a match.
    #[error("encountered a value that could not be decoded to any BSON type")]
    NoMatchingVariant,

    /// Nesting went past the configured maximum depth.
    #[error("maximum nesting depth of {0} exceeded")]
    DepthExceeded(usize),

    /// Malformed native bytes. Includes the byte offset where the problem was detected.
    #[error("malformed BSON at byte {offset}: {message}")]
    Malformed { offset: usize, message: String },

    /// A wire type byte outside the supported closed set.
    #[error("unsupported BSON element type 0x{0:02x}")]
    UnsupportedElementType(u8),

    /// Keys are written as C strings and may not contain NUL.
    #[error("invalid key {0:?}: keys must be strings without NUL bytes")]
    InvalidKey(String),

    /// The native format requires a document at the top level.
    #[error("top-level value must be a document, found {0}")]
    TopLevelNotDocument(ElementType),

    /// A value that has no faithful BSON representation (e.g. u64 above i64::MAX).
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),

    /// A typed document accessor found no entry for the key.
    #[error("key not found: {0:?}")]
    KeyNotFound(String),

    /// A typed document accessor found an entry of a different kind.
    #[error("unexpected type for key {key:?}: expected {expected}")]
    UnexpectedType { key: String, expected: ElementType },

    /// An I/O failure while reading or writing native bytes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Free-form message raised through the serde error traits.
    #[error("{0}")]
    Message(String),
}

impl BsonError {
    pub(crate) fn malformed(offset: usize, message: impl Into<String>) -> Self {
        BsonError::Malformed {
            offset,
            message: message.into(),
        }
    }
}

impl serde::ser::Error for BsonError {
    fn custom<T: Display>(msg: T) -> Self {
        BsonError::Message(msg.to_string())
    }
}

impl serde::de::Error for BsonError {
    fn custom<T: Display>(msg: T) -> Self {
        BsonError::Message(msg.to_string())
    }
}

/// Convenience alias used throughout bson-core.
pub type Result<T> = std::result::Result<T, BsonError>;
