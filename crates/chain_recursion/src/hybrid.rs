//! Hybrid merge: one recursively verified child plus an inlined transition.
//!
//! Child1 (BeginID -> RelayID) is authorized and verified like a merge child.
//! The auxiliary transition (RelayID -> EndID) runs directly in this circuit,
//! avoiding a second verification gadget when the remaining work is small.

use circuit_kit::{Builder, Circuit, ProofBundle, Wire};
use linkage::{ChainId, Fingerprint};
use serde::{Deserialize, Serialize};

use crate::allow::{check_child, AllowPolicy};
use crate::merge::self_referential_policy;
use crate::error::Result;
use crate::layout::{Declared, WitnessLayout};
use crate::packed::IdVar;
use crate::unit::StepCircuit;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridConfig {
    pub layout: WitnessLayout,
    pub policy: AllowPolicy,
}

impl HybridConfig {
    /// The child may be a leaf, an ancestor, or any self-referential level;
    /// ancestor and self children must declare this level's self slots.
    pub fn new(layout: WitnessLayout, leaf_fps: Vec<Fingerprint>, ancestor_fps: Vec<Fingerprint>) -> Self {
        Self { layout, policy: self_referential_policy(layout, leaf_fps, ancestor_fps) }
    }
}

#[derive(Clone, Debug)]
pub struct HybridAssignment {
    pub self_fps: Vec<Fingerprint>,
    pub begin: ChainId,
    pub relay: ChainId,
    pub end: ChainId,
    pub first: ProofBundle,
}

#[derive(Clone, Debug)]
pub struct HybridCircuit<S> {
    config: HybridConfig,
    aux: S,
    assignment: Option<HybridAssignment>,
}

impl<S: StepCircuit> HybridCircuit<S> {
    pub fn placeholder(config: HybridConfig, aux: S) -> Self {
        Self { config, aux, assignment: None }
    }

    pub fn new(config: HybridConfig, aux: S, assignment: HybridAssignment) -> Self {
        assert_eq!(
            assignment.self_fps.len(),
            config.layout.nb_fp_slots,
            "self fingerprint count does not match the layout"
        );
        Self { config, aux, assignment: Some(assignment) }
    }

    fn declared(&self, a: &HybridAssignment) -> Result<Declared> {
        let layout = &self.config.layout;
        let steps = if layout.step_count {
            let child = layout.decode(&a.first.public)?.steps.unwrap_or(0);
            Some(child.saturating_add(self.aux.steps()))
        } else {
            None
        };
        Ok(Declared { fingerprints: a.self_fps.clone(), begin: a.begin.clone(), end: a.end.clone(), steps })
    }
}

impl<S: StepCircuit> Circuit for HybridCircuit<S> {
    fn name(&self) -> String {
        format!("hybrid/{}", self.aux.name())
    }

    fn define(&self, b: &mut Builder) -> circuit_kit::Result<()> {
        let cfg = &self.config;
        let layout = cfg.layout;
        let a = self.assignment.as_ref();

        let declared = a.map(|a| self.declared(a)).transpose()?;
        let vars = layout.alloc_public(b, declared.as_ref())?;
        let relay = IdVar::alloc_private(b, layout.id, a.map(|a| a.relay.elements()))?;

        let first = b.alloc_bundle(layout.len(), a.map(|a| &a.first))?;
        let d1 = check_child(b, &layout, &cfg.policy, &first, &vars.fingerprints, &vars.begin, &relay, "hybrid/first")?;
        b.assert_proof(&first);

        // The auxiliary computation declares its own endpoints.
        let aux_begin = IdVar::alloc_private(b, layout.id, a.map(|a| a.relay.elements()))?;
        let aux_end = IdVar::alloc_private(b, layout.id, a.map(|a| a.end.elements()))?;
        relay.assert_equal(b, "hybrid/relay", &aux_begin);
        vars.end.assert_equal(b, "hybrid/end", &aux_end);
        self.aux.synthesize(b, &aux_begin, &aux_end)?;

        if let (Some(total), Some(s1)) = (&vars.steps, &d1.steps) {
            let sum = b.add(s1, &Wire::constant_u64(self.aux.steps()))?;
            b.assert_equal("hybrid/steps", &sum, total);
        }
        Ok(())
    }
}
