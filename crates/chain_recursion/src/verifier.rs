//! Top-level verification of a final chain proof.

use circuit_kit::{Backend, Builder, Circuit, ProofBundle, Wire};
use linkage::{AllowList, ChainId, Fingerprint};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::allow::test_in_constants;
use crate::error::{RecursionError, Result};
use crate::extractor::extract_fingerprint;
use crate::layout::{Declared, WitnessLayout};
use crate::packed::{FpVar, IdVar};

/// What a verifier accepts at the top of a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPolicy {
    /// Fingerprints allowed for the final proof.
    pub accepted: AllowList,
    /// Self fingerprints the final proof must declare, slot by slot.
    pub expected_self: Vec<Fingerprint>,
}

impl TopPolicy {
    pub fn new(accepted: AllowList, expected_self: Vec<Fingerprint>) -> Self {
        Self { accepted, expected_self }
    }

    /// Accept any of the self-referential levels, each declaring the full set.
    pub fn self_referential(self_fps: Vec<Fingerprint>) -> Self {
        let shape = match self_fps.first() {
            Some(fp) => fp.shape(),
            None => panic!("the self fingerprint set must not be empty"),
        };
        let accepted = AllowList::new(shape, self_fps.clone());
        Self { accepted, expected_self: self_fps }
    }

    fn check_layout(&self, layout: &WitnessLayout) {
        assert_eq!(
            self.expected_self.len(),
            layout.nb_fp_slots,
            "wrong number of self fingerprints for the layout"
        );
    }
}

/// Check a final proof against expected endpoints and the policy, then verify it.
pub fn verify_top<B: Backend>(
    backend: &B,
    layout: &WitnessLayout,
    policy: &TopPolicy,
    bundle: &ProofBundle,
    begin: &ChainId,
    end: &ChainId,
) -> Result<Declared> {
    policy.check_layout(layout);

    let fp = extract_fingerprint(&bundle.vk, layout.fp)?;
    if !policy.accepted.contains(&fp) {
        return Err(RecursionError::FingerprintRejected(fp.to_hex()));
    }

    let declared = layout.decode(&bundle.public)?;
    let self_ok = declared
        .fingerprints
        .iter()
        .zip(&policy.expected_self)
        .all(|(d, e)| d.is_equal(e));
    if !self_ok {
        return Err(RecursionError::SelfFingerprintMismatch);
    }
    for (which, got, want) in [("begin", &declared.begin, begin), ("end", &declared.end, end)] {
        if !got.is_equal(want) {
            return Err(RecursionError::IdMismatch { which, expected: want.to_hex(), actual: got.to_hex() });
        }
    }

    backend.verify(&bundle.proof, &bundle.vk, &bundle.public)?;
    info!(fingerprint = %fp, begin = %begin, end = %end, steps = ?declared.steps, "chain proof verified");
    Ok(declared)
}

#[derive(Clone, Debug)]
pub struct TopAssignment {
    pub bundle: ProofBundle,
    pub begin: ChainId,
    pub end: ChainId,
}

/// In-circuit form of [`verify_top`], for wrapping a chain proof into an outer proof.
/// Public inputs: BeginID, EndID.
#[derive(Clone, Debug)]
pub struct TopVerifierCircuit {
    layout: WitnessLayout,
    policy: TopPolicy,
    assignment: Option<TopAssignment>,
}

impl TopVerifierCircuit {
    pub fn placeholder(layout: WitnessLayout, policy: TopPolicy) -> Self {
        policy.check_layout(&layout);
        Self { layout, policy, assignment: None }
    }

    pub fn new(layout: WitnessLayout, policy: TopPolicy, assignment: TopAssignment) -> Self {
        policy.check_layout(&layout);
        Self { layout, policy, assignment: Some(assignment) }
    }
}

impl Circuit for TopVerifierCircuit {
    fn name(&self) -> String {
        "top_verifier".into()
    }

    fn define(&self, b: &mut Builder) -> circuit_kit::Result<()> {
        let layout = self.layout;
        let a = self.assignment.as_ref();

        let begin = IdVar::alloc_public(b, layout.id, a.map(|a| a.begin.elements()))?;
        let end = IdVar::alloc_public(b, layout.id, a.map(|a| a.end.elements()))?;
        let proof = b.alloc_bundle(layout.len(), a.map(|a| &a.bundle))?;
        let declared = layout.split(&proof.public_wires());

        let fp = FpVar::from_wires(layout.fp, b.fingerprint(&proof.key, layout.fp)?);
        let member = test_in_constants(b, &fp, &self.policy.accepted)?;
        b.assert_equal("top/accepted", &member, &Wire::one());

        for (d, e) in declared.fingerprints.iter().zip(&self.policy.expected_self) {
            d.assert_equal(b, "top/self_fingerprint", &FpVar::constant(layout.fp, e.elements()));
        }
        declared.begin.assert_equal(b, "top/begin", &begin);
        declared.end.assert_equal(b, "top/end", &end);
        b.assert_proof(&proof);
        Ok(())
    }
}
