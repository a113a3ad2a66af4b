//! # chain_recursion
//!
//! Circuits that compose proofs of a chained computation
//! `ID0 -> ID1 -> ... -> IDn` into a single proof of `ID0 -> IDn`.
//!
//! - [`UnitCircuit`] proves one application transition.
//! - [`MergeCircuit`] verifies two adjacent children and proves their
//!   concatenation; children are authorized by verifying-key fingerprint.
//! - [`HybridCircuit`] verifies one child and inlines the next transition.
//! - [`FpExtractorCircuit`] computes the fingerprint constants used by the
//!   allow-lists during bootstrap.
//! - [`verify_top`] and [`TopVerifierCircuit`] check a final proof against
//!   expected endpoints and fingerprints.
//!
//! Every shape of a chain shares one [`WitnessLayout`].

pub mod allow;
pub mod error;
pub mod extractor;
pub mod hybrid;
pub mod layout;
pub mod merge;
pub mod packed;
pub mod unit;
pub mod verifier;

pub use allow::AllowPolicy;
pub use error::{RecursionError, Result};
pub use extractor::{extract_fingerprint, run_extractor, FpExtractorCircuit};
pub use hybrid::{HybridAssignment, HybridCircuit, HybridConfig};
pub use layout::{Declared, DeclaredVars, WitnessLayout};
pub use merge::{MergeAssignment, MergeCircuit, MergeConfig, MergeKind};
pub use packed::{FpVar, IdVar, PackedVar};
pub use unit::{HashChainStep, StepCircuit, UnitAssignment, UnitCircuit, DEFAULT_TAG};
pub use verifier::{verify_top, TopAssignment, TopPolicy, TopVerifierCircuit};
