//! In-process prover.

use crate::domain::{prove, ProofResult, StateTransitionInputs, ZkProof};
use crate::ports::ZkGenerator;
use async_trait::async_trait;
use shared_types::short_hex;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct NativeProver;

impl NativeProver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ZkGenerator for NativeProver {
    async fn prove_state_transition(&self, inputs: &StateTransitionInputs) -> ProofResult<ZkProof> {
        let started = Instant::now();
        let result = prove(inputs);
        match &result {
            Ok(_) => debug!(
                did = %inputs.identifier,
                new_state = %short_hex(&inputs.new_state),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "[id-04] Native proof generated"
            ),
            Err(e) => warn!(did = %inputs.identifier, error = %e, "[id-04] Native proof failed"),
        }
        result
    }

    fn name(&self) -> &'static str {
        "native"
    }
}
