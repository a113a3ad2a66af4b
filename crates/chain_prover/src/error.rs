use std::path::PathBuf;

use chain_recursion::RecursionError;
use linkage::LinkageError;
use thiserror::Error as ThisError;

pub type Result<T> = core::result::Result<T, ProverError>;

#[derive(Debug, ThisError)]
pub enum ProverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Backend(#[from] circuit_kit::Error),

    #[error(transparent)]
    Recursion(#[from] RecursionError),

    #[error(transparent)]
    Linkage(#[from] LinkageError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown shape: {0}")]
    UnknownShape(String),

    #[error("shape {0} is not part of this setup")]
    ShapeUnavailable(String),

    #[error("missing artifact {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("stored artifacts do not match the configuration: {0}")]
    StaleArtifacts(String),

    #[error("invalid proof reference: {0}")]
    InvalidReference(String),

    #[error("chain index mismatch: {0}")]
    Index(String),

    #[error("a segment of {links} links cannot be split into two leaves (smallest leaf covers {min})")]
    SegmentTooShort { links: u64, min: u64 },
}
