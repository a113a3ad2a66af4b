use linkage::LinkageError;
use thiserror::Error as ThisError;

pub type Result<T> = core::result::Result<T, RecursionError>;

#[derive(Debug, ThisError)]
pub enum RecursionError {
    #[error(transparent)]
    Backend(#[from] circuit_kit::Error),

    #[error(transparent)]
    Linkage(#[from] LinkageError),

    #[error("fingerprint {0} is not accepted")]
    FingerprintRejected(String),

    #[error("declared self fingerprints do not match the expected set")]
    SelfFingerprintMismatch,

    #[error("{which} identifier mismatch: expected {expected}, got {actual}")]
    IdMismatch { which: &'static str, expected: String, actual: String },

    #[error("invalid public witness: {0}")]
    Layout(String),
}

impl From<RecursionError> for circuit_kit::Error {
    fn from(err: RecursionError) -> Self {
        match err {
            RecursionError::Backend(inner) => inner,
            other => circuit_kit::Error::InvalidInput(other.to_string()),
        }
    }
}
