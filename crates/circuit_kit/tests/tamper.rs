// circuit_kit/tests/tamper.rs
use ff::PrimeField;

use circuit_kit::gadgets::{pack_bytes_be, to_bytes_be};
use circuit_kit::{Backend, Builder, Circuit, Fr, ProofBundle, PublicWitness, Result, TransparentBackend, Wire};
use proptest::prelude::*;

/// Public digest word = first 16 bytes of BLAKE3(preimage) packed big-endian.
struct Preimage {
    preimage: Option<u64>,
}

fn digest_word(x: u64) -> u128 {
    let h = blake3::hash(&x.to_be_bytes());
    let mut word = [0u8; 16];
    word.copy_from_slice(&h.as_bytes()[..16]);
    u128::from_be_bytes(word)
}

impl Circuit for Preimage {
    fn name(&self) -> String { "preimage".into() }

    fn define(&self, b: &mut Builder) -> Result<()> {
        let public = b.public_input(self.preimage.map(|x| Fr::from_u128(digest_word(x))))?;
        let x = b.private_input(self.preimage.map(Fr::from))?;
        let bytes = to_bytes_be(b, &x, 8)?;
        let digest = b.blake3(&bytes)?;
        let word = pack_bytes_be(b, &digest[..16])?;
        b.assert_equal("preimage/digest", &word, &public);
        Ok(())
    }
}

fn prove(x: u64) -> ProofBundle {
    let backend = TransparentBackend;
    let cs = backend.compile(&Preimage { preimage: None }).unwrap();
    let (pk, vk) = backend.setup(&cs).unwrap();
    let (proof, public) = backend.prove(&cs, &pk, &Preimage { preimage: Some(x) }).unwrap();
    ProofBundle { vk, proof, public }
}

#[test]
fn tampered_witness_is_rejected() {
    let bundle = prove(42);
    TransparentBackend.verify(&bundle.proof, &bundle.vk, &bundle.public).unwrap();

    for idx in [0usize, 3, bundle.proof.witness.len() - 1] {
        let mut proof = bundle.proof.clone();
        proof.witness[idx] += Fr::from(1u64);
        assert!(TransparentBackend.verify(&proof, &bundle.vk, &bundle.public).is_err(), "index {idx}");
    }
}

#[test]
fn truncated_witness_is_rejected() {
    let bundle = prove(7);
    let mut proof = bundle.proof.clone();
    proof.witness.pop();
    assert!(TransparentBackend.verify(&proof, &bundle.vk, &bundle.public).is_err());
}

#[test]
fn corrupted_bytes_do_not_verify() {
    let bundle = prove(9);
    let mut bytes = bundle.to_bytes().unwrap();
    let last = bytes.len() - 20;
    bytes[last] ^= 0x01;
    match ProofBundle::from_bytes(&bytes) {
        Ok(back) => assert!(TransparentBackend.verify(&back.proof, &back.vk, &back.public).is_err()),
        Err(_) => {}
    }
}

#[test]
fn wrong_public_digest_fails_to_solve() {
    struct Forged;
    impl Circuit for Forged {
        fn name(&self) -> String { "preimage".into() }
        fn define(&self, b: &mut Builder) -> Result<()> {
            let public = b.public_input(Some(Fr::from(1u64)))?;
            let x = b.private_input(Some(Fr::from(5u64)))?;
            let bytes = to_bytes_be(b, &x, 8)?;
            let digest = b.blake3(&bytes)?;
            let word = pack_bytes_be(b, &digest[..16])?;
            b.assert_equal("preimage/digest", &word, &public);
            Ok(())
        }
    }
    let backend = TransparentBackend;
    let cs = backend.compile(&Preimage { preimage: None }).unwrap();
    let (pk, _) = backend.setup(&cs).unwrap();
    let err = backend.prove(&cs, &pk, &Forged).unwrap_err();
    assert!(err.to_string().contains("preimage/digest"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn any_preimage_proves(x in any::<u64>()) {
        let bundle = prove(x);
        prop_assert_eq!(bundle.public.values(), &[Fr::from_u128(digest_word(x))]);
        prop_assert!(TransparentBackend.verify(&bundle.proof, &bundle.vk, &bundle.public).is_ok());
        let forged = PublicWitness::new(vec![Fr::from_u128(digest_word(x.wrapping_add(1)))]);
        prop_assert!(TransparentBackend.verify(&bundle.proof, &bundle.vk, &forged).is_err());
    }
}

#[test]
fn constants_are_not_inputs() {
    let mut b = Builder::compiler("consts");
    let one = Wire::one();
    let sum = b.add(&one, &one).unwrap();
    assert_eq!(sum, Wire::constant_u64(2));
    assert_eq!(b.system().nb_public(), 0);
}
