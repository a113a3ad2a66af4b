//! # linkage
//!
//! Chain identifiers and verifying-key fingerprints.
//!
//! Both are fixed-width digests carried through recursive proofs as a short,
//! ordered sequence of bounded-width unsigned integers ("elements"). Element
//! `k` holds bytes `[k*w, (k+1)*w)` of the digest in big-endian order, where
//! `w` is the element width in bytes, so conversion to and from raw bytes is
//! lossless.

use serde::{Deserialize, Serialize};
use std::fmt;

mod error;

pub use error::{LinkageError, Result};

/// Number of elements and bit width of each element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementShape {
    nb_elements: usize,
    bits_per_element: u32,
}

impl ElementShape {
    pub const MAX_BITS: u32 = 128;

    /// Panics on an empty shape or a width that is not a non-zero multiple of
    /// eight up to [`Self::MAX_BITS`]; shapes are fixed by configuration.
    pub fn new(nb_elements: usize, bits_per_element: u32) -> Self {
        assert!(nb_elements > 0, "element shape needs at least one element");
        assert!(
            bits_per_element > 0 && bits_per_element <= Self::MAX_BITS && bits_per_element % 8 == 0,
            "bits per element must be a non-zero multiple of 8 up to {}, got {}",
            Self::MAX_BITS,
            bits_per_element
        );
        Self { nb_elements, bits_per_element }
    }

    /// Two 128-bit elements: the shape used for 256-bit digests.
    pub fn digest256() -> Self {
        Self::new(2, 128)
    }

    #[inline]
    pub fn nb_elements(&self) -> usize { self.nb_elements }

    #[inline]
    pub fn bits_per_element(&self) -> u32 { self.bits_per_element }

    #[inline]
    pub fn bytes_per_element(&self) -> usize { (self.bits_per_element / 8) as usize }

    /// Length of the raw byte encoding.
    #[inline]
    pub fn byte_len(&self) -> usize { self.nb_elements * self.bytes_per_element() }

    /// Length of the hex encoding: `2 * nb_elements * bits_per_element / 8`.
    #[inline]
    pub fn hex_len(&self) -> usize { 2 * self.byte_len() }

    fn fits(&self, element: u128) -> bool {
        self.bits_per_element == 128 || element >> self.bits_per_element == 0
    }

    fn pack(&self, bytes: &[u8]) -> Vec<u128> {
        bytes
            .chunks(self.bytes_per_element())
            .map(|chunk| chunk.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
            .collect()
    }

    fn unpack(&self, elements: &[u128]) -> Vec<u8> {
        let w = self.bytes_per_element();
        let mut out = Vec::with_capacity(self.byte_len());
        for e in elements {
            out.extend_from_slice(&e.to_be_bytes()[16 - w..]);
        }
        out
    }
}

impl fmt::Display for ElementShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.nb_elements, self.bits_per_element)
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

// ChainId and Fingerprint share their representation but must not be mixed up,
// so each gets its own type with the same codec surface.
macro_rules! packed_digest {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name {
            shape: ElementShape,
            elements: Vec<u128>,
        }

        impl $name {
            /// All-zero value, used where a shape needs a placeholder.
            pub fn zero(shape: ElementShape) -> Self {
                Self { shape, elements: vec![0; shape.nb_elements()] }
            }

            pub fn from_bytes(bytes: &[u8], shape: ElementShape) -> Result<Self> {
                if bytes.len() != shape.byte_len() {
                    return Err(LinkageError::InvalidLength { expected: shape.byte_len(), actual: bytes.len() });
                }
                Ok(Self { shape, elements: shape.pack(bytes) })
            }

            /// Accepts an optional `0x` prefix; the remaining length must be exactly
            /// [`ElementShape::hex_len`].
            pub fn from_hex(s: &str, shape: ElementShape) -> Result<Self> {
                let digits = strip_hex_prefix(s.trim());
                if digits.len() != shape.hex_len() {
                    return Err(LinkageError::InvalidHexLength { expected: shape.hex_len(), actual: digits.len() });
                }
                let bytes = hex::decode(digits)?;
                Self::from_bytes(&bytes, shape)
            }

            pub fn from_elements(shape: ElementShape, elements: Vec<u128>) -> Result<Self> {
                if elements.len() != shape.nb_elements() {
                    return Err(LinkageError::ElementCount { expected: shape.nb_elements(), actual: elements.len() });
                }
                if let Some(index) = elements.iter().position(|e| !shape.fits(*e)) {
                    return Err(LinkageError::ElementOverflow { index, bits: shape.bits_per_element() });
                }
                Ok(Self { shape, elements })
            }

            pub fn to_bytes(&self) -> Vec<u8> {
                self.shape.unpack(&self.elements)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.to_bytes())
            }

            #[inline]
            pub fn shape(&self) -> ElementShape { self.shape }

            #[inline]
            pub fn elements(&self) -> &[u128] { &self.elements }

            /// Element-wise equality. Panics when the shapes differ: comparing
            /// values of different shapes is a configuration error.
            pub fn is_equal(&self, other: &Self) -> bool {
                assert_eq!(
                    self.shape, other.shape,
                    "comparing {} values of different shapes", stringify!($name)
                );
                self.elements == other.elements
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

packed_digest!(
    /// Begin/end state digest carried through the recursion.
    ChainId
);

packed_digest!(
    /// Compressed identity of a verifying key.
    Fingerprint
);

/// Closed set of fingerprints a merge accepts as children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    shape: ElementShape,
    members: Vec<Fingerprint>,
}

impl AllowList {
    /// Panics on an empty set or on members of differing shape.
    pub fn new(shape: ElementShape, members: Vec<Fingerprint>) -> Self {
        assert!(!members.is_empty(), "allow-list must not be empty");
        for m in &members {
            assert_eq!(m.shape(), shape, "allow-list member shape mismatch");
        }
        Self { shape, members }
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.members.iter().any(|m| m.is_equal(fp))
    }

    #[inline]
    pub fn shape(&self) -> ElementShape { self.shape }

    #[inline]
    pub fn members(&self) -> &[Fingerprint] { &self.members }

    #[inline]
    pub fn len(&self) -> usize { self.members.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.members.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_shape() -> ElementShape { ElementShape::digest256() }

    #[test]
    fn test_bytes_roundtrip_and_element_order() {
        let mut bytes = [0u8; 32];
        bytes[15] = 1;
        bytes[16] = 0xff;
        let id = ChainId::from_bytes(&bytes, id_shape()).unwrap();
        assert_eq!(id.elements(), &[1u128, 0xffu128 << 120]);
        assert_eq!(id.to_bytes(), bytes.to_vec());
    }

    #[test]
    fn test_narrow_elements() {
        let shape = ElementShape::new(4, 64);
        let bytes: Vec<u8> = (0u8..32).collect();
        let fp = Fingerprint::from_bytes(&bytes, shape).unwrap();
        assert_eq!(fp.elements()[0], 0x0001020304050607);
        assert_eq!(fp.to_bytes(), bytes);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = ChainId::from_bytes(&[0u8; 31], id_shape()).unwrap_err();
        assert_eq!(err, LinkageError::InvalidLength { expected: 32, actual: 31 });
    }

    #[test]
    fn test_hex_prefix_and_length() {
        let hex = "ab".repeat(32);
        let a = ChainId::from_hex(&hex, id_shape()).unwrap();
        let b = ChainId::from_hex(&format!("0x{hex}"), id_shape()).unwrap();
        assert!(a.is_equal(&b));
        assert_eq!(a.to_hex(), hex);

        let err = ChainId::from_hex("0xabcd", id_shape()).unwrap_err();
        assert_eq!(err, LinkageError::InvalidHexLength { expected: 64, actual: 4 });
        assert!(matches!(ChainId::from_hex(&"zz".repeat(32), id_shape()), Err(LinkageError::InvalidHex(_))));
    }

    #[test]
    fn test_element_bounds() {
        let shape = ElementShape::new(2, 64);
        assert!(ChainId::from_elements(shape, vec![1, u64::MAX as u128]).is_ok());
        assert_eq!(
            ChainId::from_elements(shape, vec![1, 1u128 << 64]).unwrap_err(),
            LinkageError::ElementOverflow { index: 1, bits: 64 }
        );
        assert!(matches!(ChainId::from_elements(shape, vec![1]), Err(LinkageError::ElementCount { .. })));
    }

    #[test]
    #[should_panic(expected = "different shapes")]
    fn test_mismatched_shapes_panic() {
        let a = ChainId::zero(ElementShape::new(2, 128));
        let b = ChainId::zero(ElementShape::new(4, 64));
        let _ = a.is_equal(&b);
    }

    #[test]
    #[should_panic(expected = "multiple of 8")]
    fn test_bad_width_panics() {
        let _ = ElementShape::new(2, 127);
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn test_empty_allow_list_panics() {
        let _ = AllowList::new(id_shape(), Vec::new());
    }

    #[test]
    fn test_allow_list_membership() {
        let a = Fingerprint::from_bytes(&[1u8; 32], id_shape()).unwrap();
        let b = Fingerprint::from_bytes(&[2u8; 32], id_shape()).unwrap();
        let list = AllowList::new(id_shape(), vec![a.clone()]);
        assert!(list.contains(&a));
        assert!(!list.contains(&b));
    }
}
