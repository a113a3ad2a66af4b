//! Error types for identifier and fingerprint decoding.

use thiserror::Error as ThisError;

pub type Result<T> = core::result::Result<T, LinkageError>;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum LinkageError {
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex length: expected {expected} characters, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} elements, got {actual}")]
    ElementCount { expected: usize, actual: usize },

    #[error("element {index} does not fit in {bits} bits")]
    ElementOverflow { index: usize, bits: u32 },
}

impl From<hex::FromHexError> for LinkageError {
    fn from(err: hex::FromHexError) -> Self {
        LinkageError::InvalidHex(err.to_string())
    }
}
