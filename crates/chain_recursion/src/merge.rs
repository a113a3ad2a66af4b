//! Two-child merges: Genesis, Recursive and MultiRecursive.
//!
//! Child1 proves BeginID -> RelayID and Child2 proves RelayID -> EndID; the
//! merge proves BeginID -> EndID. Both children are authorized through
//! [`AllowPolicy`] and verified in-circuit.

use circuit_kit::{Builder, Circuit, ProofBundle};
use linkage::{AllowList, ChainId, Fingerprint};
use serde::{Deserialize, Serialize};

use crate::allow::{check_child, AllowPolicy};
use crate::error::Result;
use crate::layout::{Declared, WitnessLayout};
use crate::packed::IdVar;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeKind {
    /// Children are leaves only; the self slots are declared but unchecked.
    Genesis,
    /// One self-referential member.
    Recursive,
    /// Several self-referential members, so different merge shapes can interoperate.
    MultiRecursive,
}

impl MergeKind {
    pub fn name(&self) -> &'static str {
        match self {
            MergeKind::Genesis => "genesis",
            MergeKind::Recursive => "recursive",
            MergeKind::MultiRecursive => "multi_recursive",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub kind: MergeKind,
    pub layout: WitnessLayout,
    pub policy: AllowPolicy,
    /// Verify both children with one batched gadget.
    pub batch_verify: bool,
}

impl MergeConfig {
    pub fn genesis(layout: WitnessLayout, leaf_fps: Vec<Fingerprint>) -> Self {
        Self {
            kind: MergeKind::Genesis,
            layout,
            policy: AllowPolicy::leaves_only(AllowList::new(layout.fp, leaf_fps)),
            batch_verify: false,
        }
    }

    /// Children may be leaves, ancestors (genesis) or this level itself.
    /// Ancestor and self children must declare this level's self slot.
    pub fn recursive(layout: WitnessLayout, leaf_fps: Vec<Fingerprint>, ancestor_fps: Vec<Fingerprint>) -> Self {
        assert_eq!(layout.nb_fp_slots, 1, "a recursive merge has exactly one self fingerprint");
        Self {
            kind: MergeKind::Recursive,
            layout,
            policy: self_referential_policy(layout, leaf_fps, ancestor_fps),
            batch_verify: false,
        }
    }

    pub fn multi_recursive(layout: WitnessLayout, leaf_fps: Vec<Fingerprint>, ancestor_fps: Vec<Fingerprint>) -> Self {
        Self {
            kind: MergeKind::MultiRecursive,
            layout,
            policy: self_referential_policy(layout, leaf_fps, ancestor_fps),
            batch_verify: false,
        }
    }

    pub fn with_batch_verify(mut self, batch_verify: bool) -> Self {
        self.batch_verify = batch_verify;
        self
    }
}

pub(crate) fn self_referential_policy(
    layout: WitnessLayout,
    leaf_fps: Vec<Fingerprint>,
    ancestor_fps: Vec<Fingerprint>,
) -> AllowPolicy {
    let ancestors = (!ancestor_fps.is_empty()).then(|| AllowList::new(layout.fp, ancestor_fps));
    AllowPolicy::self_referential(AllowList::new(layout.fp, leaf_fps), ancestors)
}

#[derive(Clone, Debug)]
pub struct MergeAssignment {
    /// Values of this level's self fingerprint slots.
    pub self_fps: Vec<Fingerprint>,
    pub begin: ChainId,
    pub relay: ChainId,
    pub end: ChainId,
    pub first: ProofBundle,
    pub second: ProofBundle,
}

impl MergeAssignment {
    fn declared(&self, layout: &WitnessLayout) -> Result<Declared> {
        let steps = if layout.step_count {
            let a = layout.decode(&self.first.public)?.steps.unwrap_or(0);
            let b = layout.decode(&self.second.public)?.steps.unwrap_or(0);
            Some(a.saturating_add(b))
        } else {
            None
        };
        Ok(Declared {
            fingerprints: self.self_fps.clone(),
            begin: self.begin.clone(),
            end: self.end.clone(),
            steps,
        })
    }
}

#[derive(Clone, Debug)]
pub struct MergeCircuit {
    config: MergeConfig,
    assignment: Option<MergeAssignment>,
}

impl MergeCircuit {
    pub fn placeholder(config: MergeConfig) -> Self {
        Self { config, assignment: None }
    }

    pub fn new(config: MergeConfig, assignment: MergeAssignment) -> Self {
        assert_eq!(
            assignment.self_fps.len(),
            config.layout.nb_fp_slots,
            "self fingerprint count does not match the layout"
        );
        Self { config, assignment: Some(assignment) }
    }

    pub fn config(&self) -> &MergeConfig { &self.config }
}

impl Circuit for MergeCircuit {
    fn name(&self) -> String {
        self.config.kind.name().to_string()
    }

    fn define(&self, b: &mut Builder) -> circuit_kit::Result<()> {
        let cfg = &self.config;
        let layout = cfg.layout;
        let a = self.assignment.as_ref();

        let declared = a.map(|a| a.declared(&layout)).transpose()?;
        let vars = layout.alloc_public(b, declared.as_ref())?;
        let relay = IdVar::alloc_private(b, layout.id, a.map(|a| a.relay.elements()))?;

        let first = b.alloc_bundle(layout.len(), a.map(|a| &a.first))?;
        let second = b.alloc_bundle(layout.len(), a.map(|a| &a.second))?;

        let d1 = check_child(b, &layout, &cfg.policy, &first, &vars.fingerprints, &vars.begin, &relay, "merge/first")?;
        let d2 = check_child(b, &layout, &cfg.policy, &second, &vars.fingerprints, &relay, &vars.end, "merge/second")?;

        if let (Some(total), Some(s1), Some(s2)) = (&vars.steps, &d1.steps, &d2.steps) {
            let sum = b.add(s1, s2)?;
            b.assert_equal("merge/steps", &sum, total);
        }

        if cfg.batch_verify {
            b.assert_proofs_batched(&[&first, &second]);
        } else {
            b.assert_proof(&first);
            b.assert_proof(&second);
        }
        Ok(())
    }
}
