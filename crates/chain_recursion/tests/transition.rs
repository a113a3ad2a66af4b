// chain_recursion/tests/transition.rs
use chain_recursion::{HashChainStep, UnitCircuit, WitnessLayout};
use circuit_kit::{Backend, TransparentBackend};
use linkage::{ChainId, ElementShape};
use proptest::prelude::*;

fn layout() -> WitnessLayout {
    WitnessLayout::new(ElementShape::digest256(), ElementShape::digest256(), 1, true)
}

fn id(bytes: &[u8]) -> ChainId {
    ChainId::from_bytes(bytes, ElementShape::digest256()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn leaf_proves_native_transition(begin in prop::collection::vec(any::<u8>(), 32), iterations in 1u32..4) {
        let step = HashChainStep::with_default_tag(iterations);
        let cs = TransparentBackend.compile(&UnitCircuit::placeholder(layout(), step.clone())).unwrap();
        let (pk, vk) = TransparentBackend.setup(&cs).unwrap();

        let begin = id(&begin);
        let end = step.apply(&begin).unwrap();
        let (proof, public) = TransparentBackend
            .prove(&cs, &pk, &UnitCircuit::new(layout(), step.clone(), begin.clone(), end.clone()))
            .unwrap();
        TransparentBackend.verify(&proof, &vk, &public).unwrap();

        let declared = layout().decode(&public).unwrap();
        prop_assert_eq!(declared.begin, begin);
        prop_assert_eq!(declared.end, end);
        prop_assert_eq!(declared.steps, Some(u64::from(iterations)));
    }

    #[test]
    fn leaf_rejects_any_other_end(begin in prop::collection::vec(any::<u8>(), 32), flip in 0usize..256) {
        let step = HashChainStep::with_default_tag(1);
        let cs = TransparentBackend.compile(&UnitCircuit::placeholder(layout(), step.clone())).unwrap();
        let (pk, _) = TransparentBackend.setup(&cs).unwrap();

        let begin = id(&begin);
        let mut end = step.apply(&begin).unwrap().to_bytes();
        end[flip / 8] ^= 1 << (flip % 8);
        let result = TransparentBackend.prove(&cs, &pk, &UnitCircuit::new(layout(), step, begin, id(&end)));
        prop_assert!(result.is_err());
    }

    #[test]
    fn chain_steps_compose(begin in prop::collection::vec(any::<u8>(), 32), a in 1u32..5, b in 1u32..5) {
        let begin = id(&begin);
        let mid = HashChainStep::with_default_tag(a).apply(&begin).unwrap();
        let split = HashChainStep::with_default_tag(b).apply(&mid).unwrap();
        let joined = HashChainStep::with_default_tag(a + b).apply(&begin).unwrap();
        prop_assert_eq!(split, joined);
    }
}
