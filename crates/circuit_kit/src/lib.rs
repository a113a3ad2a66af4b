//! # circuit_kit
//!
//! Circuit description and proving surface for recursive proof composition.
//!
//! Circuits implement [`Circuit`] against a [`Builder`], which records an R1CS
//! shape plus foreign gadgets (BLAKE3, verifying-key fingerprints, nested
//! proof verification). A [`Backend`] compiles, sets up, proves and verifies
//! those shapes; [`TransparentBackend`] is the reference implementation.

pub mod backend;
pub mod builder;
pub mod error;
pub mod fingerprint;
pub mod gadgets;
pub mod r1cs;

/// Scalar field of every circuit (Pallas base field).
pub type Fr = pasta_curves::Fp;

pub use backend::{
    Backend, BaseKey, Proof, ProofBundle, ProvingKey, PublicWitness, TransparentBackend, VerifyingKey,
    VK_ELEMENTS,
};
pub use builder::{Assignment, Builder, KeyWires, ProofWires};
pub use error::{Error, Result};
pub use fingerprint::{vk_fingerprint, FINGERPRINT_BYTES};
pub use r1cs::{ConstraintSystem, Var, Wire};

/// A circuit shape. `define` must record the same structure whether the
/// builder is compiling (no values) or solving (values from the assignment).
pub trait Circuit {
    /// Shape name, part of the constraint-system identity.
    fn name(&self) -> String;

    fn define(&self, b: &mut Builder) -> Result<()>;
}
