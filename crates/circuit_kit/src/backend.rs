//! Backend trait and a transparent reference backend.
//!
//! The reference backend records the full constraint system in the verifying
//! key and ships the private witness, plus every nested key and proof consumed
//! by in-circuit verification, inside the proof. Verification re-checks the
//! structural digest, every constraint and every foreign gadget, recursing
//! into nested proofs. It is neither zero-knowledge nor succinct; a succinct
//! backend can implement the same [`Backend`] surface and replace it.

use ff::PrimeField;
use linkage::{ElementShape, Fingerprint};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::builder::{byte_value, Builder};
use crate::error::{Error, Result};
use crate::fingerprint::fingerprint_key_elements;
use crate::r1cs::{ConstraintSystem, Gadget, ProofCheck, Var, VarKind, Wire};
use crate::{Circuit, Fr};

/// Number of field elements a verifying key exposes in-circuit.
pub const VK_ELEMENTS: usize = 4;

/// Key-format version of the reference backend.
pub const BACKEND_VERSION: u32 = 1;

/// Versioned proof format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofFormatVersion(pub u8);

/// Parameters shared by every key of the same backend version and public arity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseKey {
    pub version: u32,
    pub nb_public: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey {
    pub base: BaseKey,
    /// Digest of `system`.
    pub digest: [u8; 32],
    pub system: ConstraintSystem,
}

impl VerifyingKey {
    /// In-circuit view: version, public arity, and the digest as two 128-bit halves.
    pub fn to_elements(&self) -> [Fr; VK_ELEMENTS] {
        let mut lo = [0u8; 16];
        let mut hi = [0u8; 16];
        lo.copy_from_slice(&self.digest[..16]);
        hi.copy_from_slice(&self.digest[16..]);
        [
            Fr::from(u64::from(self.base.version)),
            Fr::from(u64::from(self.base.nb_public)),
            Fr::from_u128(u128::from_le_bytes(lo)),
            Fr::from_u128(u128::from_le_bytes(hi)),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvingKey {
    pub vk: VerifyingKey,
}

/// Reference proof: private witness values plus nested hints (not ZK).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub version: ProofFormatVersion,
    #[serde(with = "crate::r1cs::serde_vec_field_bytes")]
    pub witness: Vec<Fr>,
    pub keys: Vec<VerifyingKey>,
    pub proofs: Vec<Proof>,
}

/// Public inputs in allocation order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicWitness(#[serde(with = "crate::r1cs::serde_vec_field_bytes")] pub Vec<Fr>);

impl PublicWitness {
    pub fn new(values: Vec<Fr>) -> Self { Self(values) }

    #[inline]
    pub fn values(&self) -> &[Fr] { &self.0 }

    #[inline]
    pub fn len(&self) -> usize { self.0.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// (verifying key, proof, public witness) consumed by a merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub vk: VerifyingKey,
    pub proof: Proof,
    pub public: PublicWitness,
}

macro_rules! bincode_codec {
    ($($t:ty),*) => {$(
        impl $t {
            pub fn to_bytes(&self) -> Result<Vec<u8>> { Ok(bincode::serialize(self)?) }
            pub fn from_bytes(bytes: &[u8]) -> Result<Self> { Ok(bincode::deserialize(bytes)?) }
        }
    )*};
}

bincode_codec!(ConstraintSystem, VerifyingKey, ProvingKey, Proof, PublicWitness, ProofBundle);

/// Proof-system operations used by the composition layer.
pub trait Backend {
    /// Record the shape of a circuit; the circuit's assignment is ignored.
    fn compile<C: Circuit + ?Sized>(&self, circuit: &C) -> Result<ConstraintSystem>;

    fn setup(&self, cs: &ConstraintSystem) -> Result<(ProvingKey, VerifyingKey)>;

    /// Solve the circuit with its assignment and produce a proof.
    fn prove<C: Circuit + ?Sized>(
        &self,
        cs: &ConstraintSystem,
        pk: &ProvingKey,
        circuit: &C,
    ) -> Result<(Proof, PublicWitness)>;

    fn verify(&self, proof: &Proof, vk: &VerifyingKey, public: &PublicWitness) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TransparentBackend;

impl Backend for TransparentBackend {
    fn compile<C: Circuit + ?Sized>(&self, circuit: &C) -> Result<ConstraintSystem> {
        let mut b = Builder::compiler(&circuit.name());
        circuit.define(&mut b)?;
        let (cs, _) = b.finish();
        debug!(
            name = %cs.name,
            vars = cs.num_vars(),
            constraints = cs.num_constraints(),
            gadgets = cs.gadgets.len(),
            "compiled circuit"
        );
        Ok(cs)
    }

    fn setup(&self, cs: &ConstraintSystem) -> Result<(ProvingKey, VerifyingKey)> {
        let nb_public = u32::try_from(cs.nb_public())
            .map_err(|_| Error::InvalidInput("too many public inputs".into()))?;
        let vk = VerifyingKey {
            base: BaseKey { version: BACKEND_VERSION, nb_public },
            digest: cs.digest(),
            system: cs.clone(),
        };
        Ok((ProvingKey { vk: vk.clone() }, vk))
    }

    fn prove<C: Circuit + ?Sized>(
        &self,
        cs: &ConstraintSystem,
        pk: &ProvingKey,
        circuit: &C,
    ) -> Result<(Proof, PublicWitness)> {
        let mut b = Builder::solver(&circuit.name());
        circuit.define(&mut b)?;
        let (solved, assignment) = b.finish();
        let digest = solved.digest();
        if digest != cs.digest() || digest != pk.vk.digest {
            return Err(Error::ShapeMismatch(format!(
                "solved circuit {} does not match the compiled shape {}",
                solved.name, cs.name
            )));
        }
        check_assignment(cs, &assignment.values, &assignment.keys, &assignment.proofs)?;

        let mut public = Vec::new();
        let mut witness = Vec::new();
        for (kind, value) in cs.vars.iter().zip(assignment.values) {
            match kind {
                VarKind::Instance => public.push(value),
                VarKind::Witness => witness.push(value),
            }
        }
        debug!(name = %cs.name, public = public.len(), nested = assignment.proofs.len(), "proved circuit");
        let proof = Proof {
            version: ProofFormatVersion(1),
            witness,
            keys: assignment.keys,
            proofs: assignment.proofs,
        };
        Ok((proof, PublicWitness(public)))
    }

    fn verify(&self, proof: &Proof, vk: &VerifyingKey, public: &PublicWitness) -> Result<()> {
        verify_transparent(proof, vk, public)
    }
}

fn verify_transparent(proof: &Proof, vk: &VerifyingKey, public: &PublicWitness) -> Result<()> {
    if vk.system.digest() != vk.digest {
        return Err(Error::VerificationFailed("verifying key does not match its constraint system".into()));
    }
    if vk.base.version != BACKEND_VERSION || proof.version != ProofFormatVersion(1) {
        return Err(Error::VerificationFailed("unsupported key or proof version".into()));
    }
    if public.len() != vk.base.nb_public as usize || public.len() != vk.system.nb_public() {
        return Err(Error::VerificationFailed(format!(
            "expected {} public inputs, got {}",
            vk.base.nb_public,
            public.len()
        )));
    }

    // Rehydrate assignments in variable order
    let mut values = Vec::with_capacity(vk.system.num_vars());
    let mut pub_iter = public.values().iter();
    let mut wit_iter = proof.witness.iter();
    for kind in &vk.system.vars {
        let next = match kind {
            VarKind::Instance => pub_iter.next(),
            VarKind::Witness => wit_iter.next(),
        };
        let v = next.ok_or_else(|| Error::VerificationFailed("witness length mismatch".into()))?;
        values.push(*v);
    }
    if wit_iter.next().is_some() {
        return Err(Error::VerificationFailed("witness length mismatch (extra)".into()));
    }

    check_assignment(&vk.system, &values, &proof.keys, &proof.proofs)
        .map_err(|e| Error::VerificationFailed(e.to_string()))
}

fn wire_value(values: &[Fr], w: &Wire) -> Result<Fr> {
    match w {
        Wire::Const(c) => Ok(*c),
        Wire::Var(v) => var_value(values, *v),
    }
}

fn var_value(values: &[Fr], v: Var) -> Result<Fr> {
    values.get(v.0).copied().ok_or_else(|| Error::Unsatisfied(format!("variable {} out of range", v.0)))
}

fn var_values(values: &[Fr], vars: &[Var]) -> Result<Vec<Fr>> {
    vars.iter().map(|v| var_value(values, *v)).collect()
}

/// Check every constraint and gadget of `cs` against a full assignment.
fn check_assignment(cs: &ConstraintSystem, values: &[Fr], keys: &[VerifyingKey], proofs: &[Proof]) -> Result<()> {
    if values.len() != cs.num_vars() {
        return Err(Error::Unsatisfied(format!("expected {} values, got {}", cs.num_vars(), values.len())));
    }
    if keys.len() != cs.nb_keys || proofs.len() != cs.nb_proofs {
        return Err(Error::Unsatisfied("nested key/proof count does not match the circuit".into()));
    }

    // Evaluate each constraint in value domain: <A, x> * <B, x> = <C, x>
    for (idx, c) in cs.constraints.iter().enumerate() {
        let eval = |lc: &crate::r1cs::LinearCombination| {
            lc.evaluate(values).ok_or_else(|| Error::Unsatisfied(format!("constraint {idx} references unknown variable")))
        };
        if eval(&c.a)? * eval(&c.b)? != eval(&c.c)? {
            return Err(Error::Unsatisfied(format!("constraint {} ({}) not satisfied", idx, c.label)));
        }
    }

    for gadget in &cs.gadgets {
        match gadget {
            Gadget::Blake3 { inputs, outputs } => {
                let mut bytes = Vec::with_capacity(inputs.len());
                for w in inputs {
                    let v = wire_value(values, w)?;
                    bytes.push(byte_value(&v).ok_or_else(|| Error::Unsatisfied("blake3 input is not a byte".into()))?);
                }
                let digest = blake3::hash(&bytes);
                let got = var_values(values, outputs)?;
                let ok = got.len() == 32
                    && got.iter().zip(digest.as_bytes()).all(|(v, b)| *v == Fr::from(u64::from(*b)));
                if !ok {
                    return Err(Error::Unsatisfied("blake3 output mismatch".into()));
                }
            }
            Gadget::Fingerprint { key, outputs, nb_elements, bits_per_element } => {
                let key_values = var_values(values, key)?;
                if key_values.len() != VK_ELEMENTS {
                    return Err(Error::Unsatisfied("fingerprint over a malformed key".into()));
                }
                let shape = ElementShape::new(*nb_elements, *bits_per_element);
                let fp = Fingerprint::from_bytes(&fingerprint_key_elements(&key_values), shape)
                    .map_err(|e| Error::Unsatisfied(format!("fingerprint shape: {e}")))?;
                let got = var_values(values, outputs)?;
                let expected: Vec<Fr> = fp.elements().iter().map(|e| Fr::from_u128(*e)).collect();
                if got != expected {
                    return Err(Error::Unsatisfied("fingerprint output mismatch".into()));
                }
            }
            Gadget::VerifyProof(check) => check_nested(check, values, keys, proofs)?,
            Gadget::VerifyBatch(checks) => {
                let mut base = None;
                for check in checks {
                    let key = keys.get(check.key_slot).ok_or_else(|| Error::Unsatisfied("missing nested key".into()))?;
                    match base {
                        None => base = Some(key.base),
                        Some(b) if b != key.base => {
                            return Err(Error::Unsatisfied("batched keys differ in base parameters".into()));
                        }
                        Some(_) => {}
                    }
                }
                for check in checks {
                    check_nested(check, values, keys, proofs)?;
                }
            }
        }
    }
    Ok(())
}

fn check_nested(check: &ProofCheck, values: &[Fr], keys: &[VerifyingKey], proofs: &[Proof]) -> Result<()> {
    let key = keys.get(check.key_slot).ok_or_else(|| Error::Unsatisfied("missing nested key".into()))?;
    let proof = proofs.get(check.proof_slot).ok_or_else(|| Error::Unsatisfied("missing nested proof".into()))?;
    let elements = var_values(values, &check.key)?;
    if elements.as_slice() != key.to_elements().as_slice() {
        return Err(Error::Unsatisfied("nested key does not match its in-circuit elements".into()));
    }
    let public = PublicWitness(var_values(values, &check.public)?);
    verify_transparent(proof, key, &public)
        .map_err(|e| Error::Unsatisfied(format!("nested proof rejected: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    /// Proves knowledge of `x` with `x * x == public`.
    struct Square {
        x: Option<u64>,
    }

    impl Circuit for Square {
        fn name(&self) -> String { "square".into() }

        fn define(&self, b: &mut Builder) -> Result<()> {
            let sq = self.x.map(|x| Fr::from(x * x));
            let public = b.public_input(sq)?;
            let x = b.private_input(self.x.map(Fr::from))?;
            let prod = b.mul(&x, &x)?;
            b.assert_equal("square", &prod, &public);
            Ok(())
        }
    }

    /// Verifies a `Square` proof in-circuit and exposes its public input.
    struct Outer<'a> {
        child: Option<&'a ProofBundle>,
        batch: bool,
    }

    impl Circuit for Outer<'_> {
        fn name(&self) -> String { "outer".into() }

        fn define(&self, b: &mut Builder) -> Result<()> {
            let inner = self.child.and_then(|c| c.public.values().first().copied());
            let exposed = b.public_input(inner)?;
            let child = b.alloc_bundle(1, self.child)?;
            b.assert_equal("outer/link", &Wire::Var(child.public[0]), &exposed);
            if self.batch {
                b.assert_proofs_batched(&[&child]);
            } else {
                b.assert_proof(&child);
            }
            Ok(())
        }
    }

    fn square_bundle(x: u64) -> ProofBundle {
        let backend = TransparentBackend;
        let cs = backend.compile(&Square { x: None }).unwrap();
        let (pk, vk) = backend.setup(&cs).unwrap();
        let (proof, public) = backend.prove(&cs, &pk, &Square { x: Some(x) }).unwrap();
        ProofBundle { vk, proof, public }
    }

    #[test]
    fn prove_verify_roundtrip() {
        let bundle = square_bundle(7);
        assert_eq!(bundle.public.values(), &[Fr::from(49u64)]);
        TransparentBackend.verify(&bundle.proof, &bundle.vk, &bundle.public).unwrap();

        let bytes = bundle.to_bytes().unwrap();
        let back = ProofBundle::from_bytes(&bytes).unwrap();
        TransparentBackend.verify(&back.proof, &back.vk, &back.public).unwrap();
    }

    #[test]
    fn tampered_public_input_fails() {
        let bundle = square_bundle(7);
        let forged = PublicWitness::new(vec![Fr::from(50u64)]);
        let err = TransparentBackend.verify(&bundle.proof, &bundle.vk, &forged).unwrap_err();
        assert!(matches!(err, Error::VerificationFailed(_)));
    }

    #[test]
    fn tampered_key_fails() {
        let bundle = square_bundle(3);
        let mut vk = bundle.vk.clone();
        vk.system.constraints.clear();
        assert!(TransparentBackend.verify(&bundle.proof, &vk, &bundle.public).is_err());
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let backend = TransparentBackend;
        let cs = backend.compile(&Square { x: None }).unwrap();
        let (pk, _) = backend.setup(&cs).unwrap();
        let other = backend.compile(&Outer { child: None, batch: false }).unwrap();
        let err = backend.prove(&other, &pk, &Square { x: Some(2) }).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn nested_verification() {
        let backend = TransparentBackend;
        let child = square_bundle(5);
        for batch in [false, true] {
            let cs = backend.compile(&Outer { child: None, batch }).unwrap();
            let (pk, vk) = backend.setup(&cs).unwrap();
            let (proof, public) = backend.prove(&cs, &pk, &Outer { child: Some(&child), batch }).unwrap();
            assert_eq!(public.values(), &[Fr::from(25u64)]);
            backend.verify(&proof, &vk, &public).unwrap();
        }
    }

    #[test]
    fn nested_forgery_fails_to_solve() {
        let backend = TransparentBackend;
        let mut child = square_bundle(5);
        child.public = PublicWitness::new(vec![Fr::from(26u64)]);
        let cs = backend.compile(&Outer { child: None, batch: false }).unwrap();
        let (pk, _) = backend.setup(&cs).unwrap();
        let err = backend.prove(&cs, &pk, &Outer { child: Some(&child), batch: false }).unwrap_err();
        assert!(err.to_string().starts_with("solving failed"));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = square_bundle(2).vk;
        let b = square_bundle(9).vk;
        assert_eq!(crate::vk_fingerprint(&a), crate::vk_fingerprint(&b));

        let outer = TransparentBackend.compile(&Outer { child: None, batch: false }).unwrap();
        let (_, outer_vk) = TransparentBackend.setup(&outer).unwrap();
        assert_ne!(crate::vk_fingerprint(&a), crate::vk_fingerprint(&outer_vk));
    }
}
