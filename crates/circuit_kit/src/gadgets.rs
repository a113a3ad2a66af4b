//! Composite gadgets over the builder: boolean folds, implication and byte
//! packing.

use ff::Field;

use crate::builder::Builder;
use crate::error::Result;
use crate::r1cs::{LinearCombination, Wire};
use crate::Fr;

/// AND over boolean wires; 1 for an empty slice.
pub fn and_all(b: &mut Builder, flags: &[Wire]) -> Result<Wire> {
    let mut acc = Wire::one();
    for f in flags {
        acc = b.and(&acc, f)?;
    }
    Ok(acc)
}

/// OR over boolean wires; 0 for an empty slice.
pub fn or_all(b: &mut Builder, flags: &[Wire]) -> Result<Wire> {
    let mut acc = Wire::zero();
    for f in flags {
        acc = b.or(&acc, f)?;
    }
    Ok(acc)
}

/// Enforce p => q for boolean p, q: p * (1 - q) = 0
pub fn assert_implies(b: &mut Builder, label: &str, p: &Wire, q: &Wire) {
    b.enforce(
        label,
        LinearCombination::from_wire(p),
        LinearCombination::one().with(q, -Fr::ONE),
        LinearCombination::zero(),
    );
}

/// Big-endian bytes of `x`, range-checking `x < 256^nb_bytes`.
pub fn to_bytes_be(b: &mut Builder, x: &Wire, nb_bytes: usize) -> Result<Vec<Wire>> {
    let bits = b.to_bits(x, nb_bytes * 8)?;
    let mut bytes = Vec::with_capacity(nb_bytes);
    for chunk in bits.chunks(8).rev() {
        let mut terms = Vec::with_capacity(8);
        let mut coeff = Fr::ONE;
        for bit in chunk {
            terms.push((bit.clone(), coeff));
            coeff = coeff.double();
        }
        bytes.push(b.linear(&terms)?);
    }
    Ok(bytes)
}

/// Big-endian packing of byte-valued wires into one element. Callers must
/// ensure the inputs are bytes and that the result stays below the modulus.
pub fn pack_bytes_be(b: &mut Builder, bytes: &[Wire]) -> Result<Wire> {
    let base = Fr::from(256u64);
    let mut coeff = Fr::ONE;
    let mut terms = Vec::with_capacity(bytes.len());
    for byte in bytes.iter().rev() {
        terms.push((byte.clone(), coeff));
        coeff *= base;
    }
    b.linear(&terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_folds() {
        let mut b = Builder::solver("folds");
        let t = b.private_input(Some(Fr::ONE)).unwrap();
        let f = b.private_input(Some(Fr::ZERO)).unwrap();
        let all = and_all(&mut b, &[t.clone(), f.clone()]).unwrap();
        let any = or_all(&mut b, &[f.clone(), t.clone()]).unwrap();
        assert_eq!(b.value(&all), Some(Fr::ZERO));
        assert_eq!(b.value(&any), Some(Fr::ONE));
        assert_eq!(and_all(&mut b, &[]).unwrap(), Wire::one());
        assert_eq!(or_all(&mut b, &[]).unwrap(), Wire::zero());
    }

    #[test]
    fn bytes_pack_back() {
        let mut b = Builder::solver("bytes");
        let x = b.private_input(Some(Fr::from(0x0102_0304u64))).unwrap();
        let bytes = to_bytes_be(&mut b, &x, 4).unwrap();
        let values: Vec<_> = bytes.iter().map(|w| b.value(w).unwrap()).collect();
        assert_eq!(values, [1u64, 2, 3, 4].map(Fr::from).to_vec());
        let packed = pack_bytes_be(&mut b, &bytes).unwrap();
        assert_eq!(b.value(&packed), b.value(&x));
    }
}
