use chain_recursion::{
    verify_top, Declared, HybridAssignment, HybridCircuit, MergeAssignment, MergeCircuit, StepCircuit, TopPolicy,
    UnitCircuit, WitnessLayout,
};
use circuit_kit::{Backend, ProofBundle, TransparentBackend};
use linkage::ChainId;
use tracing::{debug, info};

use crate::bootstrap::{load_or_bootstrap, ShapeRegistry};
use crate::config::ProverConfig;
use crate::error::{ProverError, Result};
use crate::store::{ArtifactStore, ProofRef, ShapeId};

/// Index reached after `steps` links from `begin`.
pub fn index_after(begin: u64, steps: u64) -> Result<u64> {
    begin
        .checked_add(steps)
        .ok_or_else(|| ProverError::Index(format!("{steps} links from index {begin} overflow")))
}

/// A proof together with where it sits in the chain.
#[derive(Clone, Debug)]
pub struct ProofArtifact {
    pub reference: ProofRef,
    pub bundle: ProofBundle,
}

impl ProofArtifact {
    pub fn declared(&self, layout: &WitnessLayout) -> Result<Declared> {
        Ok(layout.decode(&self.bundle.public)?)
    }
}

/// Proves leaves and merges over one setup, storing every proof it makes.
pub struct ChainProver<B = TransparentBackend> {
    backend: B,
    registry: ShapeRegistry,
    store: ArtifactStore,
}

impl ChainProver<TransparentBackend> {
    pub fn open(config: &ProverConfig) -> Result<Self> {
        Self::with_backend(TransparentBackend, config)
    }
}

impl<B: Backend> ChainProver<B> {
    pub fn with_backend(backend: B, config: &ProverConfig) -> Result<Self> {
        let store = ArtifactStore::open(&config.data_dir)?;
        let registry = load_or_bootstrap(&backend, config, &store)?;
        Ok(Self { backend, registry, store })
    }

    pub fn registry(&self) -> &ShapeRegistry {
        &self.registry
    }

    pub fn layout(&self) -> WitnessLayout {
        self.registry.layout
    }

    pub fn top_policy(&self) -> TopPolicy {
        self.registry.top_policy()
    }

    fn finish(&self, reference: ProofRef, proof: circuit_kit::Proof, public: circuit_kit::PublicWitness) -> Result<ProofArtifact> {
        self.store.save_proof(&reference, &proof, &public)?;
        let vk = self.registry.shape(reference.shape)?.artifacts.vk.clone();
        debug!(proof = %reference, "stored proof");
        Ok(ProofArtifact { reference, bundle: ProofBundle { vk, proof, public } })
    }

    pub fn load(&self, reference: &ProofRef) -> Result<ProofArtifact> {
        let vk = self.registry.shape(reference.shape)?.artifacts.vk.clone();
        let (proof, public) = self.store.load_proof(reference)?;
        Ok(ProofArtifact { reference: *reference, bundle: ProofBundle { vk, proof, public } })
    }

    /// Prove `begin -> end` with the `iterations` leaf shape; `end` is computed
    /// when not given.
    pub fn prove_unit(&self, iterations: u32, begin_index: u64, begin: &ChainId, end: Option<&ChainId>) -> Result<ProofArtifact> {
        let step = self.registry.leaf(iterations)?;
        let end = match end {
            Some(e) => e.clone(),
            None => step.apply(begin)?,
        };
        let reference = ProofRef::new(ShapeId::Unit(iterations), begin_index, index_after(begin_index, step.steps())?);
        let keys = self.registry.shape(reference.shape)?;
        let circuit = UnitCircuit::new(self.layout(), step.clone(), begin.clone(), end);
        let (proof, public) = self.backend.prove(&keys.artifacts.cs, &keys.artifacts.pk, &circuit)?;
        info!(proof = %reference, "proved leaf");
        self.finish(reference, proof, public)
    }

    /// Merge two adjacent proofs. Two leaves go through genesis, anything else
    /// through the recursive level.
    pub fn prove_merge(&self, first: &ProofArtifact, second: &ProofArtifact) -> Result<ProofArtifact> {
        let shape = if first.reference.shape.is_unit() && second.reference.shape.is_unit() {
            ShapeId::Genesis
        } else {
            ShapeId::Recursive
        };
        self.prove_merge_as(shape, first, second)
    }

    pub fn prove_merge_as(&self, shape: ShapeId, first: &ProofArtifact, second: &ProofArtifact) -> Result<ProofArtifact> {
        let config = match shape {
            ShapeId::Genesis => &self.registry.genesis,
            ShapeId::Recursive => &self.registry.recursive,
            other => return Err(ProverError::UnknownShape(format!("{other} is not a merge shape"))),
        };
        if first.reference.end != second.reference.begin {
            return Err(ProverError::Index(format!("{} does not end where {} begins", first.reference, second.reference)));
        }
        let layout = self.layout();
        let d1 = first.declared(&layout)?;
        let d2 = second.declared(&layout)?;

        let reference = ProofRef::new(shape, first.reference.begin, second.reference.end);
        let assignment = MergeAssignment {
            self_fps: self.registry.self_fingerprints(),
            begin: d1.begin,
            relay: d1.end,
            end: d2.end,
            first: first.bundle.clone(),
            second: second.bundle.clone(),
        };
        let keys = self.registry.shape(shape)?;
        let circuit = MergeCircuit::new(config.clone(), assignment);
        let (proof, public) = self.backend.prove(&keys.artifacts.cs, &keys.artifacts.pk, &circuit)?;
        info!(proof = %reference, first = %first.reference, second = %second.reference, "proved merge");
        self.finish(reference, proof, public)
    }

    /// Extend `first` by one auxiliary transition inlined in the hybrid shape.
    pub fn prove_hybrid(&self, first: &ProofArtifact, end: Option<&ChainId>) -> Result<ProofArtifact> {
        let (config, aux) = self
            .registry
            .hybrid
            .as_ref()
            .ok_or_else(|| ProverError::ShapeUnavailable(ShapeId::Hybrid.to_string()))?;
        let layout = self.layout();
        let d1 = first.declared(&layout)?;
        let end = match end {
            Some(e) => e.clone(),
            None => aux.apply(&d1.end)?,
        };

        let reference = ProofRef::new(ShapeId::Hybrid, first.reference.begin, index_after(first.reference.end, aux.steps())?);
        let assignment = HybridAssignment {
            self_fps: self.registry.self_fingerprints(),
            begin: d1.begin,
            relay: d1.end,
            end,
            first: first.bundle.clone(),
        };
        let keys = self.registry.shape(ShapeId::Hybrid)?;
        let circuit = HybridCircuit::new(config.clone(), aux.clone(), assignment);
        let (proof, public) = self.backend.prove(&keys.artifacts.cs, &keys.artifacts.pk, &circuit)?;
        info!(proof = %reference, first = %first.reference, "proved hybrid");
        self.finish(reference, proof, public)
    }

    /// Leaf sizes covering `links`, largest first, with at least two leaves.
    pub fn plan_leaves(&self, links: u64) -> Result<Vec<u32>> {
        let sizes: Vec<u32> = self.registry.leaves.iter().map(|s| s.iterations()).rev().collect();
        let min = sizes.last().map(|s| u64::from(*s)).unwrap_or(1);

        let cover = |cap: u64| {
            let mut left = links;
            let mut plan = Vec::new();
            while left > 0 {
                let size = sizes.iter().copied().find(|s| u64::from(*s) <= left.min(cap))?;
                plan.push(size);
                left -= u64::from(size);
            }
            Some(plan)
        };
        let plan = match cover(links) {
            Some(p) if p.len() >= 2 => Some(p),
            _ => cover(links.saturating_sub(1)),
        };
        match plan {
            Some(p) if p.len() >= 2 => Ok(p),
            _ => Err(ProverError::SegmentTooShort { links, min }),
        }
    }

    /// Prove `links` links starting at `begin`: leaves first, then pairwise
    /// merges level by level. An odd proof out is carried to the next level.
    pub fn prove_segment(&self, begin_index: u64, begin: &ChainId, links: u64) -> Result<ProofArtifact> {
        let plan = self.plan_leaves(links)?;
        info!(begin_index, links, leaves = plan.len(), "proving segment");

        let mut level = Vec::with_capacity(plan.len());
        let mut index = begin_index;
        let mut id = begin.clone();
        for size in plan {
            let leaf = self.prove_unit(size, index, &id, None)?;
            id = leaf.declared(&self.layout())?.end;
            index = leaf.reference.end;
            level.push(leaf);
        }

        let mut depth = 0;
        while level.len() > 1 {
            depth += 1;
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut members = level.into_iter();
            while let Some(first) = members.next() {
                match members.next() {
                    Some(second) => next.push(self.prove_merge(&first, &second)?),
                    None => next.push(first),
                }
            }
            debug!(depth, proofs = next.len(), "merged level");
            level = next;
        }
        level.pop().ok_or(ProverError::SegmentTooShort { links, min: 1 })
    }

    /// Top-level check of a final proof.
    pub fn verify_final(&self, artifact: &ProofArtifact, begin: &ChainId, end: &ChainId) -> Result<Declared> {
        let declared = verify_top(&self.backend, &self.registry.layout, &self.top_policy(), &artifact.bundle, begin, end)?;
        if let Some(steps) = declared.steps {
            let covered = artifact
                .reference
                .end
                .checked_sub(artifact.reference.begin)
                .ok_or_else(|| ProverError::Index(format!("{} covers an inverted range", artifact.reference)))?;
            if steps != covered {
                return Err(ProverError::Index(format!("{} declares {} steps", artifact.reference, steps)));
            }
        }
        Ok(declared)
    }
}
