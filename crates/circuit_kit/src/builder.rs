//! Circuit construction driver.
//!
//! A [`Builder`] runs in one of two modes. Compiling records the shape only;
//! solving records the same shape while computing a value for every variable.
//! Circuits are written once against the builder and must produce the same
//! structure in both modes, which the backend checks through the digest.

use ff::{Field, PrimeField};
use linkage::{ElementShape, Fingerprint};
use tracing::info;

use crate::backend::{Proof, ProofBundle, VerifyingKey, VK_ELEMENTS};
use crate::error::{Error, Result};
use crate::fingerprint::{fingerprint_key_elements, FINGERPRINT_BYTES};
use crate::r1cs::{Constraint, ConstraintSystem, Gadget, LinearCombination as Lc, ProofCheck, Var, VarKind, Wire};
use crate::Fr;

/// In-circuit verifying key: its field elements and the hint slot carrying the key.
#[derive(Clone, Debug)]
pub struct KeyWires {
    pub elements: Vec<Var>,
    pub slot: usize,
}

/// In-circuit nested proof: key, declared public inputs and proof hint slot.
#[derive(Clone, Debug)]
pub struct ProofWires {
    pub key: KeyWires,
    pub public: Vec<Var>,
    pub slot: usize,
}

impl ProofWires {
    pub fn public_wires(&self) -> Vec<Wire> {
        self.public.iter().copied().map(Wire::Var).collect()
    }
}

/// Values and hints produced by solving.
#[derive(Clone, Debug, Default)]
pub struct Assignment {
    pub values: Vec<Fr>,
    pub keys: Vec<VerifyingKey>,
    pub proofs: Vec<Proof>,
}

pub struct Builder {
    system: ConstraintSystem,
    solving: bool,
    assignment: Assignment,
}

/// Byte value of a field element, if it is below 256.
pub(crate) fn byte_value(v: &Fr) -> Option<u8> {
    let repr = v.to_repr();
    if repr[1..].iter().all(|b| *b == 0) { Some(repr[0]) } else { None }
}

impl Builder {
    /// Records structure without values.
    pub fn compiler(name: &str) -> Self {
        Self { system: ConstraintSystem::new(name), solving: false, assignment: Assignment::default() }
    }

    /// Records structure and computes every value; allocations require values.
    pub fn solver(name: &str) -> Self {
        Self { system: ConstraintSystem::new(name), solving: true, assignment: Assignment::default() }
    }

    #[inline]
    pub fn is_solving(&self) -> bool { self.solving }

    #[inline]
    pub fn system(&self) -> &ConstraintSystem { &self.system }

    pub fn finish(self) -> (ConstraintSystem, Assignment) {
        (self.system, self.assignment)
    }

    fn alloc(&mut self, kind: VarKind, value: Option<Fr>) -> Result<Var> {
        let var = Var(self.system.vars.len());
        if self.solving {
            let v = value.ok_or(Error::MissingAssignment(var.0))?;
            self.assignment.values.push(v);
        }
        self.system.vars.push(kind);
        Ok(var)
    }

    /// Allocate a public input. Public inputs form the public witness in allocation order.
    pub fn public_input(&mut self, value: Option<Fr>) -> Result<Wire> {
        Ok(Wire::Var(self.alloc(VarKind::Instance, value)?))
    }

    pub fn private_input(&mut self, value: Option<Fr>) -> Result<Wire> {
        Ok(Wire::Var(self.alloc(VarKind::Witness, value)?))
    }

    /// Value of a wire; always `None` while compiling.
    pub fn value(&self, wire: &Wire) -> Option<Fr> {
        match wire {
            Wire::Const(c) => Some(*c),
            Wire::Var(v) if self.solving => self.assignment.values.get(v.0).copied(),
            Wire::Var(_) => None,
        }
    }

    fn eval(&self, lc: &Lc) -> Option<Fr> {
        if self.solving { lc.evaluate(&self.assignment.values) } else { None }
    }

    /// Record a multiplication constraint: A * B = C
    pub fn enforce(&mut self, label: &str, a: Lc, b: Lc, c: Lc) {
        self.system.constraints.push(Constraint { label: label.to_string(), a, b, c });
    }

    /// Enforce a linear combination equals zero: lc * 1 = 0
    pub fn enforce_zero(&mut self, label: &str, lc: Lc) {
        self.enforce(label, lc, Lc::one(), Lc::zero());
    }

    /// out = sum_i coeff_i * wire_i, folded to a constant or an existing variable when possible.
    pub fn linear(&mut self, terms: &[(Wire, Fr)]) -> Result<Wire> {
        let mut lc = Lc::zero();
        for (w, coeff) in terms {
            lc.push_wire(w, *coeff);
        }
        if lc.terms.is_empty() {
            return Ok(Wire::Const(lc.constant));
        }
        if lc.terms.len() == 1 && lc.terms[0].coeff == Fr::ONE && lc.constant == Fr::ZERO {
            return Ok(Wire::Var(lc.terms[0].var));
        }
        let value = self.eval(&lc);
        let out = self.alloc(VarKind::Witness, value)?;
        lc.push_term(out, -Fr::ONE);
        self.enforce_zero("linear", lc);
        Ok(Wire::Var(out))
    }

    pub fn add(&mut self, a: &Wire, b: &Wire) -> Result<Wire> {
        self.linear(&[(a.clone(), Fr::ONE), (b.clone(), Fr::ONE)])
    }

    pub fn sub(&mut self, a: &Wire, b: &Wire) -> Result<Wire> {
        self.linear(&[(a.clone(), Fr::ONE), (b.clone(), -Fr::ONE)])
    }

    pub fn mul(&mut self, a: &Wire, b: &Wire) -> Result<Wire> {
        match (a, b) {
            (Wire::Const(x), _) => self.linear(&[(b.clone(), *x)]),
            (_, Wire::Const(y)) => self.linear(&[(a.clone(), *y)]),
            _ => {
                let value = self.value(a).zip(self.value(b)).map(|(x, y)| x * y);
                let out = Wire::Var(self.alloc(VarKind::Witness, value)?);
                self.enforce("mul", Lc::from_wire(a), Lc::from_wire(b), Lc::from_wire(&out));
                Ok(out)
            }
        }
    }

    /// Enforce a == b. Equal constants record nothing.
    pub fn assert_equal(&mut self, label: &str, a: &Wire, b: &Wire) {
        let lc = Lc::from_wire(a).with(b, -Fr::ONE);
        if lc.terms.is_empty() && lc.constant == Fr::ZERO {
            return;
        }
        self.enforce_zero(label, lc);
    }

    /// Constrain `a` to be boolean: a * (a - 1) = 0
    pub fn assert_boolean(&mut self, label: &str, a: &Wire) {
        self.enforce(label, Lc::from_wire(a), Lc::from_wire(a).with(&Wire::one(), -Fr::ONE), Lc::zero());
    }

    /// Returns 1 if `a == 0`, else 0.
    pub fn is_zero(&mut self, a: &Wire) -> Result<Wire> {
        if let Wire::Const(c) = a {
            return Ok(if bool::from(c.is_zero()) { Wire::one() } else { Wire::zero() });
        }
        let av = self.value(a);
        let inv = av.map(|v| Option::<Fr>::from(v.invert()).unwrap_or(Fr::ZERO));
        let flag = av.map(|v| if bool::from(v.is_zero()) { Fr::ONE } else { Fr::ZERO });
        let inv = Wire::Var(self.alloc(VarKind::Witness, inv)?);
        let out = Wire::Var(self.alloc(VarKind::Witness, flag)?);
        // a * inv = 1 - out
        self.enforce("is_zero/inverse", Lc::from_wire(a), Lc::from_wire(&inv), Lc::one().with(&out, -Fr::ONE));
        // a * out = 0
        self.enforce("is_zero/product", Lc::from_wire(a), Lc::from_wire(&out), Lc::zero());
        Ok(out)
    }

    /// Returns 1 if `a == b`, else 0.
    pub fn is_equal(&mut self, a: &Wire, b: &Wire) -> Result<Wire> {
        let diff = self.sub(a, b)?;
        self.is_zero(&diff)
    }

    /// Boolean AND; inputs must already be boolean.
    pub fn and(&mut self, a: &Wire, b: &Wire) -> Result<Wire> {
        self.mul(a, b)
    }

    /// Boolean OR: a + b - ab; inputs must already be boolean.
    pub fn or(&mut self, a: &Wire, b: &Wire) -> Result<Wire> {
        let ab = self.mul(a, b)?;
        self.linear(&[(a.clone(), Fr::ONE), (b.clone(), Fr::ONE), (ab, -Fr::ONE)])
    }

    pub fn not(&mut self, a: &Wire) -> Result<Wire> {
        self.linear(&[(Wire::one(), Fr::ONE), (a.clone(), -Fr::ONE)])
    }

    /// Little-endian bit decomposition of `a` into `nb_bits` boolean wires.
    pub fn to_bits(&mut self, a: &Wire, nb_bits: usize) -> Result<Vec<Wire>> {
        assert!(
            nb_bits > 0 && nb_bits < Fr::NUM_BITS as usize,
            "cannot decompose into {} bits",
            nb_bits
        );
        let repr = self.value(a).map(|v| v.to_repr());
        let mut bits = Vec::with_capacity(nb_bits);
        let mut recomposed = Lc::zero();
        let mut coeff = Fr::ONE;
        for i in 0..nb_bits {
            let value = repr.map(|r| Fr::from(u64::from((r[i / 8] >> (i % 8)) & 1)));
            let bit = Wire::Var(self.alloc(VarKind::Witness, value)?);
            self.assert_boolean("to_bits/boolean", &bit);
            recomposed.push_wire(&bit, coeff);
            coeff = coeff.double();
            bits.push(bit);
        }
        recomposed.push_wire(a, -Fr::ONE);
        self.enforce_zero("to_bits/recompose", recomposed);
        Ok(bits)
    }

    /// BLAKE3 over the byte values of `inputs`; returns 32 byte-valued wires.
    pub fn blake3(&mut self, inputs: &[Wire]) -> Result<Vec<Wire>> {
        let digest = if self.solving {
            let mut bytes = Vec::with_capacity(inputs.len());
            for w in inputs {
                let v = self.value(w).ok_or_else(|| Error::Unsatisfied("blake3 input has no value".into()))?;
                bytes.push(byte_value(&v).ok_or_else(|| Error::Unsatisfied("blake3 input is not a byte".into()))?);
            }
            Some(*blake3::hash(&bytes).as_bytes())
        } else {
            None
        };
        let mut outputs = Vec::with_capacity(32);
        for i in 0..32 {
            outputs.push(self.alloc(VarKind::Witness, digest.map(|d| Fr::from(u64::from(d[i]))))?);
        }
        self.system.gadgets.push(Gadget::Blake3 { inputs: inputs.to_vec(), outputs: outputs.clone() });
        Ok(outputs.into_iter().map(Wire::Var).collect())
    }

    /// Allocate a verifying key as private elements plus a hint slot.
    pub fn alloc_key(&mut self, key: Option<&VerifyingKey>) -> Result<KeyWires> {
        if self.solving && key.is_none() {
            return Err(Error::InvalidInput("missing verifying key".into()));
        }
        let values = key.map(|k| k.to_elements());
        let mut elements = Vec::with_capacity(VK_ELEMENTS);
        for i in 0..VK_ELEMENTS {
            elements.push(self.alloc(VarKind::Witness, values.map(|e| e[i]))?);
        }
        let slot = self.system.nb_keys;
        self.system.nb_keys += 1;
        if let (true, Some(k)) = (self.solving, key) {
            self.assignment.keys.push(k.clone());
        }
        Ok(KeyWires { elements, slot })
    }

    /// Allocate a nested proof bundle with `nb_public` declared public inputs.
    pub fn alloc_bundle(&mut self, nb_public: usize, bundle: Option<&ProofBundle>) -> Result<ProofWires> {
        if let (true, Some(b)) = (self.solving, bundle) {
            if b.public.len() != nb_public {
                return Err(Error::InvalidInput(format!(
                    "bundle declares {} public inputs, expected {}",
                    b.public.len(),
                    nb_public
                )));
            }
        }
        let key = self.alloc_key(bundle.map(|b| &b.vk))?;
        let mut public = Vec::with_capacity(nb_public);
        for i in 0..nb_public {
            let v = bundle.and_then(|b| b.public.values().get(i).copied());
            public.push(self.alloc(VarKind::Witness, v)?);
        }
        let slot = self.system.nb_proofs;
        self.system.nb_proofs += 1;
        if let (true, Some(b)) = (self.solving, bundle) {
            self.assignment.proofs.push(b.proof.clone());
        }
        Ok(ProofWires { key, public, slot })
    }

    /// Fingerprint of an in-circuit verifying key, as `shape` elements.
    pub fn fingerprint(&mut self, key: &KeyWires, shape: ElementShape) -> Result<Vec<Wire>> {
        assert_eq!(
            shape.byte_len(),
            FINGERPRINT_BYTES,
            "fingerprint shape {} does not cover {} bytes",
            shape,
            FINGERPRINT_BYTES
        );
        let elements = if self.solving {
            let values = key
                .elements
                .iter()
                .map(|v| self.value(&Wire::Var(*v)))
                .collect::<Option<Vec<Fr>>>()
                .ok_or_else(|| Error::Unsatisfied("verifying key has no value".into()))?;
            let fp = Fingerprint::from_bytes(&fingerprint_key_elements(&values), shape)
                .map_err(|e| Error::InvalidInput(e.to_string()))?;
            Some(fp.elements().to_vec())
        } else {
            None
        };
        let mut outputs = Vec::with_capacity(shape.nb_elements());
        for i in 0..shape.nb_elements() {
            let v = elements.as_ref().map(|e| Fr::from_u128(e[i]));
            outputs.push(self.alloc(VarKind::Witness, v)?);
        }
        self.system.gadgets.push(Gadget::Fingerprint {
            key: key.elements.clone(),
            outputs: outputs.clone(),
            nb_elements: shape.nb_elements(),
            bits_per_element: shape.bits_per_element(),
        });
        Ok(outputs.into_iter().map(Wire::Var).collect())
    }

    fn proof_check(proof: &ProofWires) -> ProofCheck {
        ProofCheck {
            key: proof.key.elements.clone(),
            key_slot: proof.key.slot,
            public: proof.public.clone(),
            proof_slot: proof.slot,
        }
    }

    /// Verify a nested proof against its key and declared public inputs.
    pub fn assert_proof(&mut self, proof: &ProofWires) {
        self.system.gadgets.push(Gadget::VerifyProof(Self::proof_check(proof)));
    }

    /// Verify several nested proofs in one gadget; their keys must share base parameters.
    pub fn assert_proofs_batched(&mut self, proofs: &[&ProofWires]) {
        assert!(!proofs.is_empty(), "batched verification needs at least one proof");
        let checks = proofs.iter().map(|p| Self::proof_check(p)).collect();
        self.system.gadgets.push(Gadget::VerifyBatch(checks));
    }

    /// Log wire values while solving.
    pub fn trace(&self, label: &str, wires: &[Wire]) {
        if !self.solving {
            return;
        }
        let values: Vec<String> = wires
            .iter()
            .filter_map(|w| self.value(w))
            .map(|v| hex::encode(v.to_repr()))
            .collect();
        info!(label, ?values, "circuit trace");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_solve_share_structure() {
        let run = |mut b: Builder, x: Option<u64>| {
            let x = b.public_input(x.map(Fr::from)).unwrap();
            let sq = b.mul(&x, &x).unwrap();
            let is_nine = b.is_equal(&sq, &Wire::constant_u64(9)).unwrap();
            b.assert_boolean("flag", &is_nine);
            b.finish()
        };
        let (compiled, none) = run(Builder::compiler("sq"), None);
        let (solved, assignment) = run(Builder::solver("sq"), Some(3));
        assert!(none.values.is_empty());
        assert_eq!(compiled.digest(), solved.digest());
        assert_eq!(assignment.values.len(), solved.num_vars());
    }

    #[test]
    fn solving_requires_values() {
        let mut b = Builder::solver("missing");
        assert!(matches!(b.private_input(None), Err(Error::MissingAssignment(0))));
    }

    #[test]
    fn boolean_logic_values() {
        let mut b = Builder::solver("logic");
        let t = b.private_input(Some(Fr::ONE)).unwrap();
        let f = b.private_input(Some(Fr::ZERO)).unwrap();
        let and = b.and(&t, &f).unwrap();
        let or = b.or(&t, &f).unwrap();
        let not = b.not(&f).unwrap();
        let z = b.is_zero(&f).unwrap();
        let nz = b.is_zero(&t).unwrap();
        assert_eq!(b.value(&and), Some(Fr::ZERO));
        assert_eq!(b.value(&or), Some(Fr::ONE));
        assert_eq!(b.value(&not), Some(Fr::ONE));
        assert_eq!(b.value(&z), Some(Fr::ONE));
        assert_eq!(b.value(&nz), Some(Fr::ZERO));
    }

    #[test]
    fn constants_fold() {
        let mut b = Builder::compiler("fold");
        let s = b.add(&Wire::constant_u64(2), &Wire::constant_u64(3)).unwrap();
        assert_eq!(s, Wire::constant_u64(5));
        let z = b.is_zero(&Wire::zero()).unwrap();
        assert_eq!(z, Wire::one());
        b.assert_equal("noop", &Wire::one(), &Wire::one());
        assert_eq!(b.system().num_vars(), 0);
        assert_eq!(b.system().num_constraints(), 0);
    }

    #[test]
    fn bits_are_little_endian() {
        let mut b = Builder::solver("bits");
        let x = b.private_input(Some(Fr::from(0b1011u64))).unwrap();
        let bits = b.to_bits(&x, 4).unwrap();
        let values: Vec<_> = bits.iter().map(|w| b.value(w).unwrap()).collect();
        assert_eq!(values, vec![Fr::ONE, Fr::ONE, Fr::ZERO, Fr::ONE]);
    }

    #[test]
    fn blake3_gadget_matches_native() {
        let mut b = Builder::solver("hash");
        let inputs: Vec<Wire> = b"abc".iter().map(|x| Wire::constant_u64(u64::from(*x))).collect();
        let out = b.blake3(&inputs).unwrap();
        let expected = blake3::hash(b"abc");
        for (w, byte) in out.iter().zip(expected.as_bytes()) {
            assert_eq!(b.value(w), Some(Fr::from(u64::from(*byte))));
        }
    }

    #[test]
    fn blake3_rejects_wide_inputs_while_solving() {
        let mut b = Builder::solver("hash");
        let err = b.blake3(&[Wire::constant_u64(256)]).unwrap_err();
        assert!(matches!(err, Error::Unsatisfied(_)));
    }
}
