use std::path::PathBuf;

use chain_recursion::{WitnessLayout, DEFAULT_TAG};
use linkage::ElementShape;
use serde::{Deserialize, Serialize};

use crate::error::{ProverError, Result};

/// Prover configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverConfig {
    /// Directory holding keys, proofs and the fingerprint registry.
    pub data_dir: PathBuf,
    /// Iteration counts of the leaf shapes; one unit shape per entry.
    pub unit_iterations: Vec<u32>,
    /// 1: a single Recursive level. 2: Recursive and Hybrid levels accepting each other.
    pub self_slots: usize,
    pub batch_verify: bool,
    /// Expose the number of covered links as a public input.
    pub step_count: bool,
    /// Tag appended by the hash-chain transition.
    pub tag: Vec<u8>,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./chainrec_data"),
            unit_iterations: vec![1, 2, 4, 8],
            self_slots: 2,
            batch_verify: false,
            step_count: true,
            tag: DEFAULT_TAG.to_vec(),
        }
    }
}

impl ProverConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - CHAINREC_DATA_DIR
    /// - CHAINREC_UNIT_ITERATIONS (comma-separated)
    /// - CHAINREC_SELF_SLOTS
    /// - CHAINREC_BATCH_VERIFY ("1" or "true")
    /// - CHAINREC_STEP_COUNT ("0" or "false" disables)
    /// - CHAINREC_TAG
    pub fn from_env() -> Self {
        let get = |key: &str| std::env::var(key).ok();
        let defaults = Self::default();
        let flag = |s: String| matches!(s.trim(), "1" | "true" | "yes");

        let data_dir = get("CHAINREC_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir);
        let unit_iterations = get("CHAINREC_UNIT_ITERATIONS")
            .map(|s| {
                s.split(',')
                    .map(|x| x.trim())
                    .filter(|x| !x.is_empty())
                    .filter_map(|x| x.parse::<u32>().ok())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.unit_iterations);
        let self_slots = get("CHAINREC_SELF_SLOTS")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(defaults.self_slots);
        let batch_verify = get("CHAINREC_BATCH_VERIFY").map(flag).unwrap_or(defaults.batch_verify);
        let step_count = get("CHAINREC_STEP_COUNT").map(flag).unwrap_or(defaults.step_count);
        let tag = get("CHAINREC_TAG").map(String::into_bytes).unwrap_or(defaults.tag);

        Self { data_dir, unit_iterations, self_slots, batch_verify, step_count, tag }
    }

    pub fn validate(&self) -> Result<()> {
        if self.unit_iterations.is_empty() {
            return Err(ProverError::Config("at least one leaf shape is required".into()));
        }
        if self.unit_iterations.contains(&0) {
            return Err(ProverError::Config("leaf iteration counts must be positive".into()));
        }
        if !(1..=2).contains(&self.self_slots) {
            return Err(ProverError::Config(format!(
                "self_slots must be 1 (recursive) or 2 (recursive and hybrid), got {}",
                self.self_slots
            )));
        }
        Ok(())
    }

    /// Leaf iteration counts, ascending and without duplicates.
    pub fn leaf_iterations(&self) -> Vec<u32> {
        let mut v = self.unit_iterations.clone();
        v.sort_unstable();
        v.dedup();
        v
    }

    pub fn has_hybrid(&self) -> bool {
        self.self_slots == 2
    }

    pub fn layout(&self) -> WitnessLayout {
        WitnessLayout::new(ElementShape::digest256(), ElementShape::digest256(), self.self_slots, self.step_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = ProverConfig::default();
        cfg.validate().unwrap();
        assert!(cfg.has_hybrid());
        assert_eq!(cfg.layout().nb_fp_slots, 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = ProverConfig { self_slots: 3, ..ProverConfig::default() };
        assert!(matches!(cfg.validate(), Err(ProverError::Config(_))));
        cfg.self_slots = 1;
        cfg.unit_iterations = vec![2, 0];
        assert!(cfg.validate().is_err());
        cfg.unit_iterations.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_leaf_iterations_sorted() {
        let cfg = ProverConfig { unit_iterations: vec![4, 1, 4, 2], ..ProverConfig::default() };
        assert_eq!(cfg.leaf_iterations(), vec![1, 2, 4]);
    }
}
