// linkage/tests/property.rs
use linkage::{ChainId, ElementShape, Fingerprint};
use proptest::prelude::*;

/// Shapes covering 256-bit digests split at different widths.
fn shapes() -> impl Strategy<Value = ElementShape> {
    prop_oneof![
        Just(ElementShape::new(2, 128)),
        Just(ElementShape::new(4, 64)),
        Just(ElementShape::new(1, 128)),
        Just(ElementShape::new(3, 24)),
    ]
}

fn shape_and_bytes() -> impl Strategy<Value = (ElementShape, Vec<u8>)> {
    shapes().prop_flat_map(|shape| (Just(shape), prop::collection::vec(any::<u8>(), shape.byte_len())))
}

proptest! {
    #[test]
    fn bytes_survive_element_encoding((shape, bytes) in shape_and_bytes()) {
        let id = ChainId::from_bytes(&bytes, shape).unwrap();
        prop_assert_eq!(id.to_bytes(), bytes.clone());
        prop_assert_eq!(id.elements().len(), shape.nb_elements());

        let fp = Fingerprint::from_hex(&format!("0x{}", hex::encode(&bytes)), shape).unwrap();
        prop_assert_eq!(fp.to_bytes(), bytes);
    }

    #[test]
    fn equal_iff_bytes_equal(
        (shape, a) in shape_and_bytes(),
        flip in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut b = a.clone();
        let i = flip.index(b.len());
        b[i] ^= 1 << bit;

        let id_a = ChainId::from_bytes(&a, shape).unwrap();
        let id_a2 = ChainId::from_bytes(&a, shape).unwrap();
        let id_b = ChainId::from_bytes(&b, shape).unwrap();
        prop_assert!(id_a.is_equal(&id_a2));
        prop_assert!(!id_a.is_equal(&id_b));
    }
}
