//! In-circuit identifiers and fingerprints.

use circuit_kit::gadgets::{and_all, pack_bytes_be, to_bytes_be};
use circuit_kit::{Builder, Fr, Result, Wire};
use ff::PrimeField;
use linkage::ElementShape;

/// Element wires of a chain identifier or fingerprint.
#[derive(Clone, Debug)]
pub struct PackedVar {
    shape: ElementShape,
    elements: Vec<Wire>,
}

/// In-circuit chain identifier.
pub type IdVar = PackedVar;
/// In-circuit verifying-key fingerprint.
pub type FpVar = PackedVar;

/// Native value of a field element known to fit in 128 bits.
pub(crate) fn fr_to_u128(v: &Fr) -> Option<u128> {
    let repr = v.to_repr();
    if repr[16..].iter().any(|b| *b != 0) {
        return None;
    }
    let mut lo = [0u8; 16];
    lo.copy_from_slice(&repr[..16]);
    Some(u128::from_le_bytes(lo))
}

impl PackedVar {
    pub fn alloc_public(b: &mut Builder, shape: ElementShape, value: Option<&[u128]>) -> Result<Self> {
        Self::alloc(b, shape, value, true)
    }

    pub fn alloc_private(b: &mut Builder, shape: ElementShape, value: Option<&[u128]>) -> Result<Self> {
        Self::alloc(b, shape, value, false)
    }

    fn alloc(b: &mut Builder, shape: ElementShape, value: Option<&[u128]>, public: bool) -> Result<Self> {
        if let Some(v) = value {
            assert_eq!(v.len(), shape.nb_elements(), "value does not match element shape {}", shape);
        }
        let mut elements = Vec::with_capacity(shape.nb_elements());
        for i in 0..shape.nb_elements() {
            let v = value.map(|v| Fr::from_u128(v[i]));
            let w = if public { b.public_input(v)? } else { b.private_input(v)? };
            elements.push(w);
        }
        Ok(Self { shape, elements })
    }

    pub fn constant(shape: ElementShape, elements: &[u128]) -> Self {
        assert_eq!(elements.len(), shape.nb_elements(), "constant does not match element shape {}", shape);
        Self { shape, elements: elements.iter().map(|e| Wire::Const(Fr::from_u128(*e))).collect() }
    }

    /// View existing wires (e.g. a child's declared public inputs) as a packed value.
    pub fn from_wires(shape: ElementShape, wires: Vec<Wire>) -> Self {
        assert_eq!(wires.len(), shape.nb_elements(), "wires do not match element shape {}", shape);
        Self { shape, elements: wires }
    }

    #[inline]
    pub fn shape(&self) -> ElementShape { self.shape }

    #[inline]
    pub fn elements(&self) -> &[Wire] { &self.elements }

    fn check_shape(&self, other: &Self) {
        assert_eq!(self.shape, other.shape, "comparing packed values of different shapes");
    }

    /// 1 if all elements are equal, else 0.
    pub fn is_equal(&self, b: &mut Builder, other: &Self) -> Result<Wire> {
        self.check_shape(other);
        let mut flags = Vec::with_capacity(self.elements.len());
        for (x, y) in self.elements.iter().zip(&other.elements) {
            flags.push(b.is_equal(x, y)?);
        }
        and_all(b, &flags)
    }

    pub fn assert_equal(&self, b: &mut Builder, label: &str, other: &Self) {
        self.check_shape(other);
        for (x, y) in self.elements.iter().zip(&other.elements) {
            b.assert_equal(label, x, y);
        }
    }

    /// Big-endian bytes, range-checking every element against its width.
    pub fn to_bytes(&self, b: &mut Builder) -> Result<Vec<Wire>> {
        let mut out = Vec::with_capacity(self.shape.byte_len());
        for e in &self.elements {
            out.extend(to_bytes_be(b, e, self.shape.bytes_per_element())?);
        }
        Ok(out)
    }

    /// Pack byte-valued wires; the caller guarantees they are bytes.
    pub fn from_bytes(b: &mut Builder, shape: ElementShape, bytes: &[Wire]) -> Result<Self> {
        assert_eq!(bytes.len(), shape.byte_len(), "byte length does not match element shape {}", shape);
        let mut elements = Vec::with_capacity(shape.nb_elements());
        for chunk in bytes.chunks(shape.bytes_per_element()) {
            elements.push(pack_bytes_be(b, chunk)?);
        }
        Ok(Self { shape, elements })
    }

    /// Element values while solving.
    pub fn values(&self, b: &Builder) -> Option<Vec<u128>> {
        self.elements.iter().map(|w| b.value(w).and_then(|v| fr_to_u128(&v))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ff::Field;
    use linkage::ChainId;

    #[test]
    fn bytes_roundtrip_in_circuit() {
        let shape = ElementShape::digest256();
        let bytes: Vec<u8> = (100u8..132).collect();
        let id = ChainId::from_bytes(&bytes, shape).unwrap();

        let mut b = Builder::solver("packed");
        let var = IdVar::alloc_private(&mut b, shape, Some(id.elements())).unwrap();
        let wires = var.to_bytes(&mut b).unwrap();
        let got: Vec<u8> = wires.iter().map(|w| fr_to_u128(&b.value(w).unwrap()).unwrap() as u8).collect();
        assert_eq!(got, bytes);

        let back = IdVar::from_bytes(&mut b, shape, &wires).unwrap();
        assert_eq!(back.values(&b).unwrap(), id.elements());
        let eq = var.is_equal(&mut b, &back).unwrap();
        assert_eq!(b.value(&eq), Some(Fr::ONE));
    }

    #[test]
    fn inequality_detected() {
        let shape = ElementShape::new(2, 64);
        let mut b = Builder::solver("neq");
        let x = IdVar::alloc_private(&mut b, shape, Some(&[1u128, 2][..])).unwrap();
        let y = IdVar::constant(shape, &[1, 3]);
        let eq = x.is_equal(&mut b, &y).unwrap();
        assert_eq!(b.value(&eq), Some(Fr::ZERO));
    }

    #[test]
    #[should_panic(expected = "different shapes")]
    fn shape_mismatch_panics() {
        let mut b = Builder::compiler("mismatch");
        let x = IdVar::constant(ElementShape::new(2, 128), &[0, 0]);
        let y = IdVar::constant(ElementShape::new(4, 64), &[0, 0, 0, 0]);
        let _ = x.is_equal(&mut b, &y);
    }
}
