//! R1CS recording for circuit shapes.
//!
//! Provides:
//! - Variables, linear combinations with constants and rank-1 constraints
//! - Foreign gadgets recorded alongside constraints and interpreted by the backend
//! - A compiled [`ConstraintSystem`] with a canonical structural digest

use blake3::Hasher as Blake3Hasher;
use ff::{Field, PrimeField};
use serde::{Deserialize, Serialize};

use crate::Fr;

/// Unique identifier for a variable within a constraint system
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Var(pub usize);

/// Variable kind for bookkeeping
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    /// Private witness value.
    Witness,
    /// Public input, part of the public witness in allocation order.
    Instance,
}

/// A single term of a linear combination: coeff * var
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearTerm {
    pub var: Var,
    #[serde(with = "serde_field")]
    pub coeff: Fr,
}

/// A linear combination: sum_i coeff_i * var_i + constant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearCombination {
    pub terms: Vec<LinearTerm>,
    #[serde(with = "serde_field")]
    pub constant: Fr,
}

impl LinearCombination {
    pub fn zero() -> Self { Self { terms: Vec::new(), constant: Fr::ZERO } }
    pub fn one() -> Self { Self { terms: Vec::new(), constant: Fr::ONE } }

    #[inline]
    pub fn push_term(&mut self, var: Var, coeff: Fr) { self.terms.push(LinearTerm { var, coeff }); }

    /// Adds `coeff * wire`, folding constants into the constant term.
    pub fn push_wire(&mut self, wire: &Wire, coeff: Fr) {
        match wire {
            Wire::Var(v) => {
                if !bool::from(coeff.is_zero()) {
                    self.push_term(*v, coeff);
                }
            }
            Wire::Const(c) => self.constant += *c * coeff,
        }
    }

    /// Convenience builder: lc + coeff * wire
    #[inline]
    pub fn with(mut self, wire: &Wire, coeff: Fr) -> Self { self.push_wire(wire, coeff); self }

    pub fn from_wire(wire: &Wire) -> Self { Self::zero().with(wire, Fr::ONE) }

    /// Evaluates against a full assignment; `None` when a variable is out of range.
    pub fn evaluate(&self, values: &[Fr]) -> Option<Fr> {
        let mut acc = self.constant;
        for t in &self.terms {
            acc += *values.get(t.var.0)? * t.coeff;
        }
        Some(acc)
    }

    fn absorb(&self, h: &mut Blake3Hasher) {
        h.update(&(self.terms.len() as u64).to_le_bytes());
        for t in &self.terms {
            h.update(&(t.var.0 as u64).to_le_bytes());
            h.update(t.coeff.to_repr().as_ref());
        }
        h.update(self.constant.to_repr().as_ref());
    }
}

/// One R1CS constraint: <A, x> * <B, x> = <C, x>
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub label: String,
    pub a: LinearCombination,
    pub b: LinearCombination,
    pub c: LinearCombination,
}

/// A wire value: either a variable or a constant field element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wire {
    Var(Var),
    Const(#[serde(with = "serde_field")] Fr),
}

impl Wire {
    pub fn zero() -> Self { Wire::Const(Fr::ZERO) }
    pub fn one() -> Self { Wire::Const(Fr::ONE) }

    pub fn constant_u64(v: u64) -> Self { Wire::Const(Fr::from(v)) }

    pub fn as_var(&self) -> Option<Var> {
        match self {
            Wire::Var(v) => Some(*v),
            Wire::Const(_) => None,
        }
    }

    fn absorb(&self, h: &mut Blake3Hasher) {
        match self {
            Wire::Var(v) => { h.update(&[0u8]); h.update(&(v.0 as u64).to_le_bytes()); }
            Wire::Const(c) => { h.update(&[1u8]); h.update(c.to_repr().as_ref()); }
        }
    }
}

/// Reference from a verification gadget to a nested proof.
///
/// `key` holds the in-circuit elements of the child verifying key and
/// `public` the child's declared public inputs; the key and proof objects
/// themselves travel as hints in slots `key_slot` / `proof_slot`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofCheck {
    pub key: Vec<Var>,
    pub key_slot: usize,
    pub public: Vec<Var>,
    pub proof_slot: usize,
}

/// Foreign gadgets record non-R1CS semantics alongside constraints.
/// The backend interprets them natively when checking an assignment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gadget {
    /// `outputs` are the 32 bytes of BLAKE3 over the byte values of `inputs`.
    Blake3 { inputs: Vec<Wire>, outputs: Vec<Var> },
    /// `outputs` are the fingerprint elements of the verifying key whose
    /// in-circuit elements are `key`.
    Fingerprint { key: Vec<Var>, outputs: Vec<Var>, nb_elements: usize, bits_per_element: u32 },
    /// The nested proof verifies against the key and public inputs.
    VerifyProof(ProofCheck),
    /// Several nested proofs sharing identical base key parameters.
    VerifyBatch(Vec<ProofCheck>),
}

impl ProofCheck {
    fn absorb(&self, h: &mut Blake3Hasher) {
        absorb_vars(h, &self.key);
        h.update(&(self.key_slot as u64).to_le_bytes());
        absorb_vars(h, &self.public);
        h.update(&(self.proof_slot as u64).to_le_bytes());
    }
}

impl Gadget {
    fn absorb(&self, h: &mut Blake3Hasher) {
        match self {
            Gadget::Blake3 { inputs, outputs } => {
                h.update(b"blake3");
                h.update(&(inputs.len() as u64).to_le_bytes());
                for w in inputs { w.absorb(h); }
                absorb_vars(h, outputs);
            }
            Gadget::Fingerprint { key, outputs, nb_elements, bits_per_element } => {
                h.update(b"fingerprint");
                absorb_vars(h, key);
                absorb_vars(h, outputs);
                h.update(&(*nb_elements as u64).to_le_bytes());
                h.update(&bits_per_element.to_le_bytes());
            }
            Gadget::VerifyProof(check) => {
                h.update(b"verify");
                check.absorb(h);
            }
            Gadget::VerifyBatch(checks) => {
                h.update(b"verify_batch");
                h.update(&(checks.len() as u64).to_le_bytes());
                for c in checks { c.absorb(h); }
            }
        }
    }
}

fn absorb_vars(h: &mut Blake3Hasher, vars: &[Var]) {
    h.update(&(vars.len() as u64).to_le_bytes());
    for v in vars {
        h.update(&(v.0 as u64).to_le_bytes());
    }
}

/// Compiled circuit shape: variables, constraints and gadgets, no values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSystem {
    /// Shape name, mixed into the digest.
    pub name: String,
    pub vars: Vec<VarKind>,
    pub constraints: Vec<Constraint>,
    pub gadgets: Vec<Gadget>,
    /// Number of verifying-key hint slots.
    pub nb_keys: usize,
    /// Number of nested-proof hint slots.
    pub nb_proofs: usize,
}

impl ConstraintSystem {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vars: Vec::new(),
            constraints: Vec::new(),
            gadgets: Vec::new(),
            nb_keys: 0,
            nb_proofs: 0,
        }
    }

    #[inline]
    pub fn num_vars(&self) -> usize { self.vars.len() }

    #[inline]
    pub fn num_constraints(&self) -> usize { self.constraints.len() }

    pub fn nb_public(&self) -> usize {
        self.vars.iter().filter(|k| matches!(k, VarKind::Instance)).count()
    }

    /// Canonical digest of the structure (excludes any assignment).
    pub fn digest(&self) -> [u8; 32] {
        let mut h = Blake3Hasher::new();
        h.update(b"r1cs:v1");
        h.update(&(self.name.len() as u64).to_le_bytes());
        h.update(self.name.as_bytes());
        h.update(&(self.vars.len() as u64).to_le_bytes());
        h.update(&(self.constraints.len() as u64).to_le_bytes());
        h.update(&(self.gadgets.len() as u64).to_le_bytes());
        h.update(&(self.nb_keys as u64).to_le_bytes());
        h.update(&(self.nb_proofs as u64).to_le_bytes());

        for vk in &self.vars {
            match vk { VarKind::Witness => { h.update(&[0u8]); }, VarKind::Instance => { h.update(&[1u8]); } }
        }
        for c in &self.constraints {
            h.update(&(c.label.len() as u64).to_le_bytes());
            h.update(c.label.as_bytes());
            c.a.absorb(&mut h);
            c.b.absorb(&mut h);
            c.c.absorb(&mut h);
        }
        for g in &self.gadgets {
            g.absorb(&mut h);
        }
        *h.finalize().as_bytes()
    }
}

/// Helper module to (de)serialize a field element as its canonical bytes
pub(crate) mod serde_field {
    use crate::Fr;
    use ff::PrimeField;
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(f: &Fr, s: S) -> Result<S::Ok, S::Error> {
        f.to_repr().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Fr, D::Error> {
        let bytes = <[u8; 32]>::deserialize(d)?;
        let opt: Option<Fr> = Fr::from_repr(bytes).into();
        opt.ok_or_else(|| DeError::custom("invalid field repr"))
    }
}

// Helper module to (de)serialize Vec<Fr> as sequences of canonical bytes
pub(crate) mod serde_vec_field_bytes {
    use crate::Fr;
    use ff::PrimeField;
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(v: &[Fr], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(v.len()))?;
        for f in v.iter() {
            seq.serialize_element(&f.to_repr())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Fr>, D::Error> {
        let raw = Vec::<[u8; 32]>::deserialize(d)?;
        raw.into_iter()
            .map(|bytes| {
                let opt: Option<Fr> = Fr::from_repr(bytes).into();
                opt.ok_or_else(|| DeError::custom("invalid field repr"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_tracks_structure_only() {
        let mut a = ConstraintSystem::new("shape");
        a.vars.push(VarKind::Instance);
        a.vars.push(VarKind::Witness);
        let lc = LinearCombination::from_wire(&Wire::Var(Var(0))).with(&Wire::Var(Var(1)), -Fr::ONE);
        a.constraints.push(Constraint { label: "eq".into(), a: lc, b: LinearCombination::one(), c: LinearCombination::zero() });

        let b = a.clone();
        assert_eq!(a.digest(), b.digest());

        let mut renamed = a.clone();
        renamed.name = "other".into();
        assert_ne!(a.digest(), renamed.digest());

        let mut extra = a.clone();
        extra.gadgets.push(Gadget::Blake3 { inputs: vec![Wire::Var(Var(0))], outputs: vec![Var(1)] });
        assert_ne!(a.digest(), extra.digest());
    }

    #[test]
    fn constants_fold_into_lc() {
        let lc = LinearCombination::zero()
            .with(&Wire::Const(Fr::from(3u64)), Fr::from(2u64))
            .with(&Wire::Var(Var(0)), Fr::ZERO)
            .with(&Wire::Var(Var(1)), Fr::ONE);
        assert_eq!(lc.terms.len(), 1);
        assert_eq!(lc.constant, Fr::from(6u64));
        assert_eq!(lc.evaluate(&[Fr::from(9u64), Fr::from(4u64)]), Some(Fr::from(10u64)));
        assert_eq!(lc.evaluate(&[Fr::ONE]), None);
    }

    #[test]
    fn system_roundtrips_through_bincode() {
        let mut cs = ConstraintSystem::new("serde");
        cs.vars.push(VarKind::Witness);
        cs.constraints.push(Constraint {
            label: "c".into(),
            a: LinearCombination::from_wire(&Wire::Var(Var(0))),
            b: LinearCombination::one(),
            c: LinearCombination::zero().with(&Wire::Const(-Fr::ONE), Fr::ONE),
        });
        let bytes = bincode::serialize(&cs).unwrap();
        let back: ConstraintSystem = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, cs);
        assert_eq!(back.digest(), cs.digest());
    }
}
