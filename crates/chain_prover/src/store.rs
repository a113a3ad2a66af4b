//! On-disk artifacts.
//!
//! ```text
//! <dir>/<shape>.ccs                 compiled constraint system
//! <dir>/<shape>.pk, <shape>.vk      keys
//! <dir>/<shape>_<b>_<e>.proof       proof covering chain indices b..e
//! <dir>/<shape>_<b>_<e>.wtns        its public witness
//! <dir>/fingerprints.json           shape -> hex fingerprint
//! <dir>/layout.json                 setup metadata
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chain_recursion::WitnessLayout;
use circuit_kit::{ConstraintSystem, Proof, ProvingKey, PublicWitness, VerifyingKey};
use linkage::Fingerprint;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProverError, Result};

/// Identifies one circuit shape of a setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShapeId {
    /// Leaf running the hash chain this many times.
    Unit(u32),
    Genesis,
    Recursive,
    Hybrid,
}

impl ShapeId {
    pub fn is_unit(&self) -> bool {
        matches!(self, ShapeId::Unit(_))
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeId::Unit(n) => write!(f, "unit_{n}"),
            ShapeId::Genesis => f.write_str("genesis"),
            ShapeId::Recursive => f.write_str("recursive"),
            ShapeId::Hybrid => f.write_str("hybrid"),
        }
    }
}

impl FromStr for ShapeId {
    type Err = ProverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "genesis" => Ok(ShapeId::Genesis),
            "recursive" => Ok(ShapeId::Recursive),
            "hybrid" => Ok(ShapeId::Hybrid),
            other => other
                .strip_prefix("unit_")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map(ShapeId::Unit)
                .ok_or_else(|| ProverError::UnknownShape(other.to_string())),
        }
    }
}

/// A stored proof: its shape and the chain indices it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofRef {
    pub shape: ShapeId,
    pub begin: u64,
    pub end: u64,
}

impl ProofRef {
    pub fn new(shape: ShapeId, begin: u64, end: u64) -> Self {
        Self { shape, begin, end }
    }

    fn stem(&self) -> String {
        format!("{}_{}_{}", self.shape, self.begin, self.end)
    }
}

/// `shape:begin:end`
impl fmt::Display for ProofRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.shape, self.begin, self.end)
    }
}

impl FromStr for ProofRef {
    type Err = ProverError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let [shape, begin, end] = parts[..] else {
            return Err(ProverError::InvalidReference(format!("expected shape:begin:end, got {s:?}")));
        };
        let index = |x: &str| {
            x.parse::<u64>()
                .map_err(|_| ProverError::InvalidReference(format!("bad chain index {x:?} in {s:?}")))
        };
        let (begin, end) = (index(begin)?, index(end)?);
        if begin >= end {
            return Err(ProverError::InvalidReference(format!("empty or inverted range {begin}..{end} in {s:?}")));
        }
        Ok(Self { shape: shape.parse()?, begin, end })
    }
}

/// Setup parameters recorded next to the artifacts; a mismatch on load means
/// the stored keys belong to another configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub version: u32,
    pub layout: WitnessLayout,
    pub unit_iterations: Vec<u32>,
    pub batch_verify: bool,
    /// Hex of the hash-chain tag.
    pub tag: String,
}

pub const STORE_VERSION: u32 = 1;

#[derive(Clone, Debug)]
pub struct ShapeArtifacts {
    pub cs: ConstraintSystem,
    pub pk: ProvingKey,
    pub vk: VerifyingKey,
}

#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: String) -> PathBuf {
        self.dir.join(name)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut f = File::create(path)?;
        f.write_all(bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "wrote artifact");
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        if !path.exists() {
            return Err(ProverError::MissingArtifact(path.to_path_buf()));
        }
        let mut buf = Vec::new();
        File::open(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn save_shape(&self, shape: ShapeId, artifacts: &ShapeArtifacts) -> Result<()> {
        self.write(&self.path(format!("{shape}.ccs")), &artifacts.cs.to_bytes()?)?;
        self.write(&self.path(format!("{shape}.pk")), &artifacts.pk.to_bytes()?)?;
        self.write(&self.path(format!("{shape}.vk")), &artifacts.vk.to_bytes()?)?;
        Ok(())
    }

    pub fn has_shape(&self, shape: ShapeId) -> bool {
        ["ccs", "pk", "vk"].iter().all(|ext| self.path(format!("{shape}.{ext}")).exists())
    }

    pub fn load_shape(&self, shape: ShapeId) -> Result<ShapeArtifacts> {
        let cs = ConstraintSystem::from_bytes(&self.read(&self.path(format!("{shape}.ccs")))?)?;
        let pk = ProvingKey::from_bytes(&self.read(&self.path(format!("{shape}.pk")))?)?;
        let vk = VerifyingKey::from_bytes(&self.read(&self.path(format!("{shape}.vk")))?)?;
        Ok(ShapeArtifacts { cs, pk, vk })
    }

    pub fn save_proof(&self, r: &ProofRef, proof: &Proof, public: &PublicWitness) -> Result<()> {
        self.write(&self.path(format!("{}.proof", r.stem())), &proof.to_bytes()?)?;
        self.write(&self.path(format!("{}.wtns", r.stem())), &public.to_bytes()?)?;
        Ok(())
    }

    pub fn load_proof(&self, r: &ProofRef) -> Result<(Proof, PublicWitness)> {
        let proof = Proof::from_bytes(&self.read(&self.path(format!("{}.proof", r.stem())))?)?;
        let public = PublicWitness::from_bytes(&self.read(&self.path(format!("{}.wtns", r.stem())))?)?;
        Ok((proof, public))
    }

    pub fn save_fingerprints(&self, fps: &BTreeMap<ShapeId, Fingerprint>) -> Result<()> {
        let registry: BTreeMap<String, String> = fps.iter().map(|(k, v)| (k.to_string(), v.to_hex())).collect();
        self.write(&self.path("fingerprints.json".into()), serde_json::to_string_pretty(&registry)?.as_bytes())
    }

    /// Shape name -> hex fingerprint.
    pub fn load_fingerprints(&self) -> Result<BTreeMap<String, String>> {
        let bytes = self.read(&self.path("fingerprints.json".into()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save_meta(&self, meta: &StoreMeta) -> Result<()> {
        self.write(&self.path("layout.json".into()), serde_json::to_string_pretty(meta)?.as_bytes())
    }

    pub fn load_meta(&self) -> Result<Option<StoreMeta>> {
        let path = self.path("layout.json".into());
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&self.read(&path)?)?))
    }
}
