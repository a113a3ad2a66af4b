//! Setup pipeline.
//!
//! Each phase needs the fingerprints of the previous one as compile-time
//! constants, so shapes are set up in order:
//!
//! 1. leaves (one per iteration count)
//! 2. genesis, accepting the leaves
//! 3. recursive, accepting leaves and genesis (pinned to the self slots) as
//!    constants
//! 4. hybrid (with two self slots), same constants
//!
//! Recursive and hybrid never appear in each other's constants; they reach
//! each other through the declared self slots.

use std::collections::BTreeMap;

use chain_recursion::{
    run_extractor, HashChainStep, HybridCircuit, HybridConfig, MergeCircuit, MergeConfig, TopPolicy, UnitCircuit,
    WitnessLayout,
};
use circuit_kit::{Backend, Circuit, ConstraintSystem};
use linkage::{AllowList, Fingerprint};
use tracing::{debug, info, warn};

use crate::config::ProverConfig;
use crate::error::{ProverError, Result};
use crate::store::{ArtifactStore, ShapeArtifacts, ShapeId, StoreMeta, STORE_VERSION};

/// Keys and fingerprint of one shape.
#[derive(Clone, Debug)]
pub struct ShapeKeys {
    pub artifacts: ShapeArtifacts,
    pub fingerprint: Fingerprint,
}

/// Everything needed to prove and verify with one setup.
#[derive(Clone, Debug)]
pub struct ShapeRegistry {
    pub layout: WitnessLayout,
    pub leaves: Vec<HashChainStep>,
    pub genesis: MergeConfig,
    pub recursive: MergeConfig,
    pub hybrid: Option<(HybridConfig, HashChainStep)>,
    shapes: BTreeMap<ShapeId, ShapeKeys>,
}

impl ShapeRegistry {
    pub fn shape(&self, id: ShapeId) -> Result<&ShapeKeys> {
        self.shapes.get(&id).ok_or_else(|| ProverError::ShapeUnavailable(id.to_string()))
    }

    pub fn fingerprint(&self, id: ShapeId) -> Result<&Fingerprint> {
        Ok(&self.shape(id)?.fingerprint)
    }

    pub fn shapes(&self) -> impl Iterator<Item = (&ShapeId, &ShapeKeys)> {
        self.shapes.iter()
    }

    pub fn leaf(&self, iterations: u32) -> Result<&HashChainStep> {
        self.leaves
            .iter()
            .find(|s| s.iterations() == iterations)
            .ok_or_else(|| ProverError::ShapeUnavailable(ShapeId::Unit(iterations).to_string()))
    }

    /// Values of the self slots every non-leaf proof declares.
    pub fn self_fingerprints(&self) -> Vec<Fingerprint> {
        let mut fps = vec![self.shapes[&ShapeId::Recursive].fingerprint.clone()];
        if let Some(h) = self.shapes.get(&ShapeId::Hybrid) {
            fps.push(h.fingerprint.clone());
        }
        fps
    }

    /// Final proofs may come from any self-referential level or from genesis.
    pub fn top_policy(&self) -> TopPolicy {
        let expected_self = self.self_fingerprints();
        let mut accepted = expected_self.clone();
        accepted.push(self.shapes[&ShapeId::Genesis].fingerprint.clone());
        TopPolicy::new(AllowList::new(self.layout.fp, accepted), expected_self)
    }
}

fn meta_for(config: &ProverConfig) -> StoreMeta {
    StoreMeta {
        version: STORE_VERSION,
        layout: config.layout(),
        unit_iterations: config.leaf_iterations(),
        batch_verify: config.batch_verify,
        tag: hex::encode(&config.tag),
    }
}

struct Phases<'a, B> {
    backend: &'a B,
    layout: WitnessLayout,
    shapes: BTreeMap<ShapeId, ShapeKeys>,
}

impl<B: Backend> Phases<'_, B> {
    fn setup<C: Circuit + ?Sized>(&mut self, id: ShapeId, circuit: &C) -> Result<Fingerprint> {
        let cs: ConstraintSystem = self.backend.compile(circuit)?;
        let (pk, vk) = self.backend.setup(&cs)?;
        let fingerprint = run_extractor(self.backend, &vk, self.layout.fp)?;
        info!(
            shape = %id,
            constraints = cs.num_constraints(),
            vars = cs.num_vars(),
            fingerprint = %fingerprint,
            "set up shape"
        );
        self.shapes.insert(id, ShapeKeys { artifacts: ShapeArtifacts { cs, pk, vk }, fingerprint: fingerprint.clone() });
        Ok(fingerprint)
    }
}

fn configs(
    config: &ProverConfig,
    layout: WitnessLayout,
    leaf_fps: &[Fingerprint],
    genesis_fp: &Fingerprint,
) -> (MergeConfig, Option<HybridConfig>) {
    let ancestors = vec![genesis_fp.clone()];
    let recursive = if config.has_hybrid() {
        MergeConfig::multi_recursive(layout, leaf_fps.to_vec(), ancestors.clone())
    } else {
        MergeConfig::recursive(layout, leaf_fps.to_vec(), ancestors.clone())
    }
    .with_batch_verify(config.batch_verify);
    let hybrid = config.has_hybrid().then(|| HybridConfig::new(layout, leaf_fps.to_vec(), ancestors));
    (recursive, hybrid)
}

fn leaves(config: &ProverConfig) -> Vec<HashChainStep> {
    config.leaf_iterations().into_iter().map(|n| HashChainStep::new(n, config.tag.clone())).collect()
}

/// Compile, set up and fingerprint every shape, then persist them.
pub fn bootstrap<B: Backend>(backend: &B, config: &ProverConfig, store: &ArtifactStore) -> Result<ShapeRegistry> {
    config.validate()?;
    let layout = config.layout();
    let leaves = leaves(config);
    let mut phases = Phases { backend, layout, shapes: BTreeMap::new() };

    info!(leaves = leaves.len(), self_slots = layout.nb_fp_slots, "bootstrap phase 1: leaves");
    let mut leaf_fps = Vec::with_capacity(leaves.len());
    for step in &leaves {
        leaf_fps.push(phases.setup(ShapeId::Unit(step.iterations()), &UnitCircuit::placeholder(layout, step.clone()))?);
    }

    info!("bootstrap phase 2: genesis");
    let genesis = MergeConfig::genesis(layout, leaf_fps.clone()).with_batch_verify(config.batch_verify);
    let genesis_fp = phases.setup(ShapeId::Genesis, &MergeCircuit::placeholder(genesis.clone()))?;

    let (recursive, hybrid_cfg) = configs(config, layout, &leaf_fps, &genesis_fp);
    info!(kind = recursive.kind.name(), "bootstrap phase 3: recursive");
    phases.setup(ShapeId::Recursive, &MergeCircuit::placeholder(recursive.clone()))?;

    let hybrid = match hybrid_cfg {
        Some(cfg) => {
            info!("bootstrap phase 4: hybrid");
            let aux = leaves[0].clone();
            phases.setup(ShapeId::Hybrid, &HybridCircuit::placeholder(cfg.clone(), aux.clone()))?;
            Some((cfg, aux))
        }
        None => None,
    };

    let registry = ShapeRegistry { layout, leaves, genesis, recursive, hybrid, shapes: phases.shapes };
    persist(store, config, &registry)?;
    Ok(registry)
}

fn persist(store: &ArtifactStore, config: &ProverConfig, registry: &ShapeRegistry) -> Result<()> {
    for (id, keys) in &registry.shapes {
        store.save_shape(*id, &keys.artifacts)?;
    }
    let fps = registry.shapes.iter().map(|(id, k)| (*id, k.fingerprint.clone())).collect();
    store.save_fingerprints(&fps)?;
    store.save_meta(&meta_for(config))?;
    info!(dir = %store.dir().display(), shapes = registry.shapes.len(), "saved setup artifacts");
    Ok(())
}

/// Reuse the artifacts in `store` when they match `config`; bootstrap otherwise.
pub fn load_or_bootstrap<B: Backend>(backend: &B, config: &ProverConfig, store: &ArtifactStore) -> Result<ShapeRegistry> {
    config.validate()?;
    match store.load_meta()? {
        None => bootstrap(backend, config, store),
        Some(meta) => {
            let current = meta_for(config);
            if meta != current {
                return Err(ProverError::StaleArtifacts(format!(
                    "stored layout {:?} / leaves {:?} / tag {} differ from {:?} / {:?} / {}",
                    meta.layout, meta.unit_iterations, meta.tag, current.layout, current.unit_iterations, current.tag
                )));
            }
            load(config, store)
        }
    }
}

fn load(config: &ProverConfig, store: &ArtifactStore) -> Result<ShapeRegistry> {
    let layout = config.layout();
    let leaves = leaves(config);
    let registry = store.load_fingerprints()?;

    let mut ids: Vec<ShapeId> = leaves.iter().map(|s| ShapeId::Unit(s.iterations())).collect();
    ids.extend([ShapeId::Genesis, ShapeId::Recursive]);
    if config.has_hybrid() {
        ids.push(ShapeId::Hybrid);
    }

    let mut shapes = BTreeMap::new();
    for id in ids {
        let artifacts = store.load_shape(id)?;
        if artifacts.vk.digest != artifacts.cs.digest() || artifacts.pk.vk != artifacts.vk {
            return Err(ProverError::StaleArtifacts(format!("keys of {id} do not match its constraint system")));
        }
        let fingerprint = chain_recursion::extract_fingerprint(&artifacts.vk, layout.fp)?;
        match registry.get(&id.to_string()) {
            Some(hex) => {
                if Fingerprint::from_hex(hex, layout.fp)? != fingerprint {
                    return Err(ProverError::StaleArtifacts(format!("registry fingerprint of {id} is out of date")));
                }
            }
            None => warn!(shape = %id, "shape missing from fingerprint registry"),
        }
        debug!(shape = %id, fingerprint = %fingerprint, "loaded shape");
        shapes.insert(id, ShapeKeys { artifacts, fingerprint });
    }

    let leaf_fps: Vec<Fingerprint> = leaves.iter().map(|s| shapes[&ShapeId::Unit(s.iterations())].fingerprint.clone()).collect();
    let genesis = MergeConfig::genesis(layout, leaf_fps.clone()).with_batch_verify(config.batch_verify);
    let (recursive, hybrid_cfg) = configs(config, layout, &leaf_fps, &shapes[&ShapeId::Genesis].fingerprint);
    let hybrid = hybrid_cfg.map(|cfg| (cfg, leaves[0].clone()));

    info!(dir = %store.dir().display(), shapes = shapes.len(), "loaded setup artifacts");
    Ok(ShapeRegistry { layout, leaves, genesis, recursive, hybrid, shapes })
}
