//! Proof generation port.

use crate::domain::{ProofResult, StateTransitionInputs, ZkProof};
use async_trait::async_trait;

/// Produces state-transition proofs.
///
/// Implementations must be deterministic given unchanged inputs, so a
/// failed attempt can simply be retried on the next publication cycle.
#[async_trait]
pub trait ZkGenerator: Send + Sync {
    async fn prove_state_transition(&self, inputs: &StateTransitionInputs) -> ProofResult<ZkProof>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
