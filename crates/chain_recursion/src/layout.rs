//! Public-input layout shared by every shape of one chain.
//!
//! `[nb_fp_slots x Fingerprint][BeginID][EndID][step count?]`
//!
//! Merges read a child's declared values through this schema instead of raw
//! offsets, so every shape that can appear as a child must use the same layout.

use std::ops::Range;

use circuit_kit::{Builder, Fr, PublicWitness, Wire, FINGERPRINT_BYTES};
use ff::PrimeField;
use linkage::{ChainId, ElementShape, Fingerprint};
use serde::{Deserialize, Serialize};

use crate::error::{RecursionError, Result};
use crate::packed::{fr_to_u128, FpVar, IdVar};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessLayout {
    pub id: ElementShape,
    pub fp: ElementShape,
    /// One slot per self-referential allow-list member.
    pub nb_fp_slots: usize,
    pub step_count: bool,
}

/// Declared public values of one proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declared {
    pub fingerprints: Vec<Fingerprint>,
    pub begin: ChainId,
    pub end: ChainId,
    pub steps: Option<u64>,
}

/// In-circuit view of declared public values.
#[derive(Clone, Debug)]
pub struct DeclaredVars {
    pub fingerprints: Vec<FpVar>,
    pub begin: IdVar,
    pub end: IdVar,
    pub steps: Option<Wire>,
}

impl WitnessLayout {
    /// Panics on an empty self-referential set or a fingerprint shape that does
    /// not cover a full fingerprint.
    pub fn new(id: ElementShape, fp: ElementShape, nb_fp_slots: usize, step_count: bool) -> Self {
        assert!(nb_fp_slots > 0, "wrong number of self fingerprints: the self-referential set must not be empty");
        assert_eq!(fp.byte_len(), FINGERPRINT_BYTES, "fingerprint shape {} must cover {} bytes", fp, FINGERPRINT_BYTES);
        Self { id, fp, nb_fp_slots, step_count }
    }

    pub fn fingerprint_range(&self, slot: usize) -> Range<usize> {
        assert!(slot < self.nb_fp_slots, "fingerprint slot {} out of range", slot);
        let n = self.fp.nb_elements();
        slot * n..(slot + 1) * n
    }

    pub fn begin_range(&self) -> Range<usize> {
        let start = self.nb_fp_slots * self.fp.nb_elements();
        start..start + self.id.nb_elements()
    }

    pub fn end_range(&self) -> Range<usize> {
        let start = self.begin_range().end;
        start..start + self.id.nb_elements()
    }

    pub fn step_index(&self) -> Option<usize> {
        self.step_count.then(|| self.end_range().end)
    }

    /// Number of public inputs.
    pub fn len(&self) -> usize {
        self.end_range().end + usize::from(self.step_count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_declared(&self, d: &Declared) {
        assert_eq!(d.fingerprints.len(), self.nb_fp_slots, "declared fingerprint count does not match the layout");
        assert!(d.fingerprints.iter().all(|f| f.shape() == self.fp), "declared fingerprint shape does not match the layout");
        assert!(d.begin.shape() == self.id && d.end.shape() == self.id, "declared identifier shape does not match the layout");
        assert_eq!(d.steps.is_some(), self.step_count, "declared step count does not match the layout");
    }

    /// Allocate this layout as the circuit's public inputs, in order.
    pub fn alloc_public(&self, b: &mut Builder, value: Option<&Declared>) -> circuit_kit::Result<DeclaredVars> {
        if let Some(d) = value {
            self.check_declared(d);
        }
        let mut fingerprints = Vec::with_capacity(self.nb_fp_slots);
        for slot in 0..self.nb_fp_slots {
            fingerprints.push(FpVar::alloc_public(b, self.fp, value.map(|d| d.fingerprints[slot].elements()))?);
        }
        let begin = IdVar::alloc_public(b, self.id, value.map(|d| d.begin.elements()))?;
        let end = IdVar::alloc_public(b, self.id, value.map(|d| d.end.elements()))?;
        let steps = if self.step_count {
            Some(b.public_input(value.and_then(|d| d.steps).map(Fr::from))?)
        } else {
            None
        };
        Ok(DeclaredVars { fingerprints, begin, end, steps })
    }

    /// View a child's declared public wires.
    pub fn split(&self, public: &[Wire]) -> DeclaredVars {
        assert_eq!(public.len(), self.len(), "public input count does not match the layout");
        let fingerprints = (0..self.nb_fp_slots)
            .map(|slot| FpVar::from_wires(self.fp, public[self.fingerprint_range(slot)].to_vec()))
            .collect();
        DeclaredVars {
            fingerprints,
            begin: IdVar::from_wires(self.id, public[self.begin_range()].to_vec()),
            end: IdVar::from_wires(self.id, public[self.end_range()].to_vec()),
            steps: self.step_index().map(|i| public[i].clone()),
        }
    }

    pub fn encode(&self, d: &Declared) -> PublicWitness {
        self.check_declared(d);
        let mut values = Vec::with_capacity(self.len());
        for fp in &d.fingerprints {
            values.extend(fp.elements().iter().map(|e| Fr::from_u128(*e)));
        }
        values.extend(d.begin.elements().iter().map(|e| Fr::from_u128(*e)));
        values.extend(d.end.elements().iter().map(|e| Fr::from_u128(*e)));
        if let Some(s) = d.steps {
            values.push(Fr::from(s));
        }
        PublicWitness::new(values)
    }

    pub fn decode(&self, public: &PublicWitness) -> Result<Declared> {
        if public.len() != self.len() {
            return Err(RecursionError::Layout(format!(
                "expected {} public inputs, got {}",
                self.len(),
                public.len()
            )));
        }
        let values = public.values();
        let elements = |range: Range<usize>| -> Result<Vec<u128>> {
            values[range]
                .iter()
                .map(|v| fr_to_u128(v).ok_or_else(|| RecursionError::Layout("element exceeds 128 bits".into())))
                .collect()
        };
        let mut fingerprints = Vec::with_capacity(self.nb_fp_slots);
        for slot in 0..self.nb_fp_slots {
            fingerprints.push(Fingerprint::from_elements(self.fp, elements(self.fingerprint_range(slot))?)?);
        }
        let begin = ChainId::from_elements(self.id, elements(self.begin_range())?)?;
        let end = ChainId::from_elements(self.id, elements(self.end_range())?)?;
        let steps = match self.step_index() {
            Some(i) => Some(
                fr_to_u128(&values[i])
                    .and_then(|s| u64::try_from(s).ok())
                    .ok_or_else(|| RecursionError::Layout("step count exceeds 64 bits".into()))?,
            ),
            None => None,
        };
        Ok(Declared { fingerprints, begin, end, steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(slots: usize, steps: bool) -> WitnessLayout {
        WitnessLayout::new(ElementShape::digest256(), ElementShape::digest256(), slots, steps)
    }

    #[test]
    fn ranges_follow_schema() {
        let l = layout(2, true);
        assert_eq!(l.fingerprint_range(0), 0..2);
        assert_eq!(l.fingerprint_range(1), 2..4);
        assert_eq!(l.begin_range(), 4..6);
        assert_eq!(l.end_range(), 6..8);
        assert_eq!(l.step_index(), Some(8));
        assert_eq!(l.len(), 9);
        assert_eq!(layout(1, false).len(), 6);
    }

    #[test]
    fn encode_decode() {
        let l = layout(1, true);
        let shape = ElementShape::digest256();
        let d = Declared {
            fingerprints: vec![Fingerprint::from_bytes(&[7u8; 32], shape).unwrap()],
            begin: ChainId::from_bytes(&[1u8; 32], shape).unwrap(),
            end: ChainId::from_bytes(&[2u8; 32], shape).unwrap(),
            steps: Some(4),
        };
        let public = l.encode(&d);
        assert_eq!(public.len(), l.len());
        assert_eq!(l.decode(&public).unwrap(), d);
        assert!(matches!(layout(2, true).decode(&public), Err(RecursionError::Layout(_))));
    }

    #[test]
    fn alloc_matches_encode() {
        let l = layout(1, false);
        let shape = ElementShape::digest256();
        let d = Declared {
            fingerprints: vec![Fingerprint::zero(shape)],
            begin: ChainId::from_bytes(&[3u8; 32], shape).unwrap(),
            end: ChainId::from_bytes(&[4u8; 32], shape).unwrap(),
            steps: None,
        };
        let mut b = Builder::solver("layout");
        let vars = l.alloc_public(&mut b, Some(&d)).unwrap();
        assert_eq!(vars.begin.values(&b).unwrap(), d.begin.elements());
        let (_, assignment) = b.finish();
        assert_eq!(assignment.values, l.encode(&d).values());
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn empty_self_set_panics() {
        let _ = layout(0, false);
    }
}
