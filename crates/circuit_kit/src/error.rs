use thiserror::Error as ThisError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// The assignment does not satisfy a constraint or gadget.
    #[error("solving failed: {0}")]
    Unsatisfied(String),

    /// A variable was allocated without a value while solving.
    #[error("missing assignment for variable {0}")]
    MissingAssignment(usize),

    /// The solved circuit does not have the shape the keys were built for.
    #[error("constraint system mismatch: {0}")]
    ShapeMismatch(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
