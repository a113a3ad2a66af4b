//! Child authorization shared by the merge and hybrid circuits.
//!
//! For a child with fingerprint `fp` (recomputed from its verifying key):
//!
//! - `leaf_test`: `fp` is one of the compile-time leaf constants
//! - `ancestor_test`: `fp` is one of the compile-time ancestor constants,
//!   merge shapes below this level that declare self slots
//! - `self_test`: `fp` equals one of this level's declared self fingerprints
//! - accept iff any of the three holds
//! - `self_test OR ancestor_test` implies the child declared exactly this
//!   level's self fingerprints, slot by slot
//!
//! The declared self fingerprints are public inputs; the level above pins them,
//! and the top-level verifier pins the last level against constants.

use circuit_kit::gadgets::{and_all, assert_implies, or_all};
use circuit_kit::{Builder, ProofWires, Wire};
use linkage::AllowList;
use serde::{Deserialize, Serialize};

use crate::layout::{DeclaredVars, WitnessLayout};
use crate::packed::{FpVar, IdVar};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowPolicy {
    /// Leaf fingerprints. Leaves declare no self slots.
    pub leaves: AllowList,
    /// Ancestor fingerprints; such children must declare this level's self slots.
    pub ancestors: Option<AllowList>,
    /// Accept children whose fingerprint is one of the declared self fingerprints.
    pub self_referential: bool,
}

impl AllowPolicy {
    pub fn leaves_only(leaves: AllowList) -> Self {
        Self { leaves, ancestors: None, self_referential: false }
    }

    /// Leaves, optional ancestors, and this level's own self set.
    pub fn self_referential(leaves: AllowList, ancestors: Option<AllowList>) -> Self {
        if let Some(a) = &ancestors {
            assert_eq!(a.shape(), leaves.shape(), "leaf and ancestor fingerprints differ in shape");
        }
        Self { leaves, ancestors, self_referential: true }
    }
}

/// 1 if `fp` is one of `members`.
pub(crate) fn test_in_constants(b: &mut Builder, fp: &FpVar, list: &AllowList) -> circuit_kit::Result<Wire> {
    let mut flags = Vec::with_capacity(list.len());
    for m in list.members() {
        flags.push(fp.is_equal(b, &FpVar::constant(list.shape(), m.elements()))?);
    }
    or_all(b, &flags)
}

/// Authorize one child and tie its declared identifiers to `begin`/`end`.
/// Returns the child's declared values.
#[allow(clippy::too_many_arguments)]
pub(crate) fn check_child(
    b: &mut Builder,
    layout: &WitnessLayout,
    policy: &AllowPolicy,
    child: &ProofWires,
    self_fps: &[FpVar],
    begin: &IdVar,
    end: &IdVar,
    label: &str,
) -> circuit_kit::Result<DeclaredVars> {
    let declared = layout.split(&child.public_wires());
    let fp = FpVar::from_wires(layout.fp, b.fingerprint(&child.key, layout.fp)?);

    let leaf_test = test_in_constants(b, &fp, &policy.leaves)?;

    let mut pinned_flags = Vec::with_capacity(self_fps.len() + 1);
    if policy.self_referential {
        for s in self_fps {
            pinned_flags.push(fp.is_equal(b, s)?);
        }
    }
    if let Some(ancestors) = &policy.ancestors {
        pinned_flags.push(test_in_constants(b, &fp, ancestors)?);
    }
    let accepted = if pinned_flags.is_empty() {
        leaf_test
    } else {
        let pinned = or_all(b, &pinned_flags)?;
        let mut same_flags = Vec::with_capacity(self_fps.len());
        for (d, s) in declared.fingerprints.iter().zip(self_fps) {
            same_flags.push(d.is_equal(b, s)?);
        }
        let same = and_all(b, &same_flags)?;
        assert_implies(b, &format!("{label}/self_fingerprint"), &pinned, &same);
        b.or(&pinned, &leaf_test)?
    };
    b.assert_equal(&format!("{label}/allow_list"), &accepted, &Wire::one());

    declared.begin.assert_equal(b, &format!("{label}/begin"), begin);
    declared.end.assert_equal(b, &format!("{label}/end"), end);
    Ok(declared)
}
