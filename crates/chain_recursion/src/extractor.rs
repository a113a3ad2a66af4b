//! Fingerprint extraction.
//!
//! Offline only: run once per circuit shape to produce the allow-list
//! constants compiled into the next shapes of the bootstrap.

use circuit_kit::{vk_fingerprint, Backend, Builder, Circuit, VerifyingKey};
use linkage::{ElementShape, Fingerprint};
use tracing::info;

use crate::error::{RecursionError, Result};
use crate::packed::{fr_to_u128, FpVar};

/// Native fingerprint of a verifying key.
pub fn extract_fingerprint(vk: &VerifyingKey, shape: ElementShape) -> Result<Fingerprint> {
    Ok(Fingerprint::from_bytes(&vk_fingerprint(vk), shape)?)
}

/// Circuit that recomputes a key's fingerprint in-circuit, logs it and
/// exposes it as its public inputs.
#[derive(Clone, Debug)]
pub struct FpExtractorCircuit {
    shape: ElementShape,
    vk: Option<VerifyingKey>,
}

impl FpExtractorCircuit {
    pub fn placeholder(shape: ElementShape) -> Self {
        Self { shape, vk: None }
    }

    pub fn new(shape: ElementShape, vk: VerifyingKey) -> Self {
        Self { shape, vk: Some(vk) }
    }
}

impl Circuit for FpExtractorCircuit {
    fn name(&self) -> String {
        "fp_extractor".into()
    }

    fn define(&self, b: &mut Builder) -> circuit_kit::Result<()> {
        let expected = self
            .vk
            .as_ref()
            .map(|vk| extract_fingerprint(vk, self.shape))
            .transpose()?;
        let public = FpVar::alloc_public(b, self.shape, expected.as_ref().map(|f| f.elements()))?;
        let key = b.alloc_key(self.vk.as_ref())?;
        let computed = FpVar::from_wires(self.shape, b.fingerprint(&key, self.shape)?);
        b.trace("fingerprint", computed.elements());
        computed.assert_equal(b, "extractor/fingerprint", &public);
        Ok(())
    }
}

/// Prove the extractor circuit for `vk` and read the fingerprint from its public inputs.
pub fn run_extractor<B: Backend>(backend: &B, vk: &VerifyingKey, shape: ElementShape) -> Result<Fingerprint> {
    let cs = backend.compile(&FpExtractorCircuit::placeholder(shape))?;
    let (pk, extractor_vk) = backend.setup(&cs)?;
    let (proof, public) = backend.prove(&cs, &pk, &FpExtractorCircuit::new(shape, vk.clone()))?;
    backend.verify(&proof, &extractor_vk, &public)?;

    let elements = public
        .values()
        .iter()
        .map(|v| fr_to_u128(v).ok_or_else(|| RecursionError::Layout("fingerprint element exceeds 128 bits".into())))
        .collect::<Result<Vec<_>>>()?;
    let fp = Fingerprint::from_elements(shape, elements)?;
    info!(shape = %vk.system.name, fingerprint = %fp, "extracted fingerprint");
    Ok(fp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::WitnessLayout;
    use crate::unit::{HashChainStep, UnitCircuit};
    use circuit_kit::TransparentBackend;

    #[test]
    fn circuit_and_native_agree() {
        let backend = TransparentBackend;
        let shape = ElementShape::digest256();
        let layout = WitnessLayout::new(shape, shape, 1, false);
        let cs = backend.compile(&UnitCircuit::placeholder(layout, HashChainStep::with_default_tag(1))).unwrap();
        let (_, vk) = backend.setup(&cs).unwrap();

        let native = extract_fingerprint(&vk, shape).unwrap();
        let again = extract_fingerprint(&vk, shape).unwrap();
        let proved = run_extractor(&backend, &vk, shape).unwrap();
        assert_eq!(native, again);
        assert_eq!(native, proved);
        assert_eq!(native.to_bytes(), vk_fingerprint(&vk).to_vec());
    }
}
