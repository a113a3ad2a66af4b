//! Leaf step: one application transition `transition(BeginID) == EndID`.

use circuit_kit::{Builder, Circuit, Wire};
use linkage::{ChainId, Fingerprint};

use crate::error::Result;
use crate::layout::{Declared, WitnessLayout};
use crate::packed::IdVar;

/// Tag appended to every hash-chain link.
pub const DEFAULT_TAG: &[u8] = b"chainrec example";

/// Pluggable transition proved by a leaf, and inlined by a hybrid merge.
pub trait StepCircuit {
    /// Name of the transition; distinct transitions must use distinct names.
    fn name(&self) -> String;

    /// Number of chain links covered by one execution.
    fn steps(&self) -> u64;

    /// Constrain `end == transition(begin)`.
    fn synthesize(&self, b: &mut Builder, begin: &IdVar, end: &IdVar) -> circuit_kit::Result<()>;
}

#[derive(Clone, Debug)]
pub struct UnitAssignment {
    pub begin: ChainId,
    pub end: ChainId,
    /// Values for the fingerprint slots; they only keep the layout uniform.
    pub padding: Vec<Fingerprint>,
}

/// Leaf circuit. Public inputs follow the chain's [`WitnessLayout`], with the
/// fingerprint slots left unconstrained.
#[derive(Clone, Debug)]
pub struct UnitCircuit<S> {
    layout: WitnessLayout,
    step: S,
    assignment: Option<UnitAssignment>,
}

impl<S: StepCircuit> UnitCircuit<S> {
    pub fn placeholder(layout: WitnessLayout, step: S) -> Self {
        Self { layout, step, assignment: None }
    }

    pub fn new(layout: WitnessLayout, step: S, begin: ChainId, end: ChainId) -> Self {
        let padding = vec![Fingerprint::zero(layout.fp); layout.nb_fp_slots];
        Self { layout, step, assignment: Some(UnitAssignment { begin, end, padding }) }
    }

    pub fn step(&self) -> &S { &self.step }
}

impl<S: StepCircuit> Circuit for UnitCircuit<S> {
    fn name(&self) -> String {
        format!("unit/{}", self.step.name())
    }

    fn define(&self, b: &mut Builder) -> circuit_kit::Result<()> {
        let steps = self.step.steps();
        let declared = self.assignment.as_ref().map(|a| Declared {
            fingerprints: a.padding.clone(),
            begin: a.begin.clone(),
            end: a.end.clone(),
            steps: self.layout.step_count.then_some(steps),
        });
        let vars = self.layout.alloc_public(b, declared.as_ref())?;
        if let Some(s) = &vars.steps {
            b.assert_equal("unit/steps", s, &Wire::constant_u64(steps));
        }
        self.step.synthesize(b, &vars.begin, &vars.end)
    }
}

/// Reference transition: `EndID = H^iterations(BeginID)` with
/// `H(x) = BLAKE3(x || tag)`. Needs 32-byte identifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashChainStep {
    iterations: u32,
    tag: Vec<u8>,
}

impl HashChainStep {
    pub fn new(iterations: u32, tag: impl Into<Vec<u8>>) -> Self {
        assert!(iterations > 0, "a hash-chain step needs at least one iteration");
        Self { iterations, tag: tag.into() }
    }

    pub fn with_default_tag(iterations: u32) -> Self {
        Self::new(iterations, DEFAULT_TAG)
    }

    #[inline]
    pub fn iterations(&self) -> u32 { self.iterations }

    #[inline]
    pub fn tag(&self) -> &[u8] { &self.tag }

    fn link(&self, bytes: &[u8]) -> [u8; 32] {
        let mut h = blake3::Hasher::new();
        h.update(bytes);
        h.update(&self.tag);
        *h.finalize().as_bytes()
    }

    /// Native transition.
    pub fn apply(&self, id: &ChainId) -> Result<ChainId> {
        let mut bytes = id.to_bytes();
        for _ in 0..self.iterations {
            bytes = self.link(&bytes).to_vec();
        }
        Ok(ChainId::from_bytes(&bytes, id.shape())?)
    }
}

impl StepCircuit for HashChainStep {
    fn name(&self) -> String {
        format!("hash_chain_{}", self.iterations)
    }

    fn steps(&self) -> u64 {
        u64::from(self.iterations)
    }

    fn synthesize(&self, b: &mut Builder, begin: &IdVar, end: &IdVar) -> circuit_kit::Result<()> {
        assert_eq!(begin.shape().byte_len(), 32, "hash-chain identifiers must be 32 bytes");
        let tag: Vec<Wire> = self.tag.iter().map(|t| Wire::constant_u64(u64::from(*t))).collect();
        let mut bytes = begin.to_bytes(b)?;
        for _ in 0..self.iterations {
            let mut input = bytes;
            input.extend(tag.iter().cloned());
            bytes = b.blake3(&input)?;
        }
        let computed = IdVar::from_bytes(b, begin.shape(), &bytes)?;
        end.assert_equal(b, "unit/transition", &computed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuit_kit::{Backend, TransparentBackend};
    use linkage::ElementShape;

    fn layout() -> WitnessLayout {
        WitnessLayout::new(ElementShape::digest256(), ElementShape::digest256(), 1, true)
    }

    #[test]
    fn native_chain_composes() {
        let begin = ChainId::from_bytes(&[0u8; 32], ElementShape::digest256()).unwrap();
        let one = HashChainStep::with_default_tag(1);
        let two = HashChainStep::with_default_tag(2);
        let mid = one.apply(&begin).unwrap();
        assert_eq!(one.apply(&mid).unwrap(), two.apply(&begin).unwrap());
        assert_ne!(mid, begin);
    }

    #[test]
    fn unit_proves_transition() {
        let backend = TransparentBackend;
        let step = HashChainStep::with_default_tag(2);
        let cs = backend.compile(&UnitCircuit::placeholder(layout(), step.clone())).unwrap();
        let (pk, vk) = backend.setup(&cs).unwrap();

        let begin = ChainId::from_bytes(&[9u8; 32], ElementShape::digest256()).unwrap();
        let end = step.apply(&begin).unwrap();
        let (proof, public) = backend.prove(&cs, &pk, &UnitCircuit::new(layout(), step.clone(), begin.clone(), end.clone())).unwrap();
        backend.verify(&proof, &vk, &public).unwrap();

        let declared = layout().decode(&public).unwrap();
        assert_eq!(declared.begin, begin);
        assert_eq!(declared.end, end);
        assert_eq!(declared.steps, Some(2));
    }

    #[test]
    fn wrong_end_fails_to_solve() {
        let backend = TransparentBackend;
        let step = HashChainStep::with_default_tag(1);
        let cs = backend.compile(&UnitCircuit::placeholder(layout(), step.clone())).unwrap();
        let (pk, _) = backend.setup(&cs).unwrap();
        let begin = ChainId::from_bytes(&[1u8; 32], ElementShape::digest256()).unwrap();
        let wrong = ChainId::from_bytes(&[2u8; 32], ElementShape::digest256()).unwrap();
        let err = backend.prove(&cs, &pk, &UnitCircuit::new(layout(), step, begin, wrong)).unwrap_err();
        assert!(err.to_string().contains("unit/transition"));
    }

    #[test]
    fn shapes_differ_per_iteration_count() {
        let backend = TransparentBackend;
        let a = backend.compile(&UnitCircuit::placeholder(layout(), HashChainStep::with_default_tag(1))).unwrap();
        let b = backend.compile(&UnitCircuit::placeholder(layout(), HashChainStep::with_default_tag(2))).unwrap();
        assert_ne!(a.digest(), b.digest());
    }
}
