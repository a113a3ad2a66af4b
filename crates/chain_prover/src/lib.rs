//! # chain_prover
//!
//! Orchestration over the composition circuits: configuration, the setup
//! pipeline that threads fingerprints from one shape into the next, on-disk
//! artifacts, and a prover that turns a run of chain links into one proof.

pub mod bootstrap;
pub mod chain;
pub mod config;
pub mod error;
pub mod store;

pub use bootstrap::{bootstrap, load_or_bootstrap, ShapeKeys, ShapeRegistry};
pub use chain::{index_after, ChainProver, ProofArtifact};
pub use config::ProverConfig;
pub use error::{ProverError, Result};
pub use store::{ArtifactStore, ProofRef, ShapeArtifacts, ShapeId, StoreMeta};
