//! Verifying-key fingerprints: Poseidon over the key's field elements.

use ff::PrimeField;
use halo2_gadgets::poseidon::primitives::{self as poseidon_primitives, ConstantLength, P128Pow5T3};

use crate::backend::{VerifyingKey, VK_ELEMENTS};
use crate::Fr;

/// Byte length of a fingerprint (one canonical field element).
pub const FINGERPRINT_BYTES: usize = 32;

const FINGERPRINT_TAG: u64 = 0x6670_7631;
const INPUT_LEN: usize = VK_ELEMENTS + 1;

/// H(tag, key elements) with width-3, rate-2 Poseidon, as canonical bytes.
///
/// Panics if `elements` is not a full key.
pub fn fingerprint_key_elements(elements: &[Fr]) -> [u8; FINGERPRINT_BYTES] {
    assert_eq!(elements.len(), VK_ELEMENTS, "verifying key has {} elements", VK_ELEMENTS);
    let mut input = [Fr::from(FINGERPRINT_TAG); INPUT_LEN];
    input[1..].copy_from_slice(elements);
    poseidon_primitives::Hash::<Fr, P128Pow5T3, ConstantLength<INPUT_LEN>, 3, 2>::init()
        .hash(input)
        .to_repr()
}

/// Fingerprint bytes of a verifying key. Depends on the key only.
pub fn vk_fingerprint(vk: &VerifyingKey) -> [u8; FINGERPRINT_BYTES] {
    fingerprint_key_elements(&vk.to_elements())
}
