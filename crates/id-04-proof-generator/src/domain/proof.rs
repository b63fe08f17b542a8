//! # State Transition Proof
//!
//! The proof handed to the state contract, in Groth16 calldata shape
//! (`a`, `b`, `c`), plus the native circuit that produces and checks it.
//!
//! ## Native circuit
//!
//! Constraints on a [`StateTransitionInputs`]:
//!
//! 1. `old_state == H(old_roots)` and `new_state == H(new_roots)`.
//! 2. `new_state != old_state`.
//! 3. The auth key signed `H(old_state || new_state)`.
//! 4. `new_state` is not zero.
//!
//! The witness is committed with a Keccak Merkle tree. A Fiat-Shamir
//! challenge derived from the commitment and public signals selects the
//! evaluation point and the opened leaf.

use super::commitment::WitnessCommitment;
use super::errors::{ProofError, ProofResult};
use super::field::{evaluate, FieldElement};
use super::inputs::StateTransitionInputs;
use id_03_identity_state::transition_message;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use shared_crypto::{keccak256_many, EddsaPublicKey, EddsaSignature};
use shared_types::{Hash, ZERO_HASH};

/// Proof accepted by the state contract's `transitState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkProof {
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
    pub public_signals: Vec<U256>,
}

/// Check the circuit constraints. Returns the reason of the first failure.
pub fn check_constraints(inputs: &StateTransitionInputs) -> ProofResult<()> {
    let fail = |reason: &str| Err(ProofError::ProofGenerationFailed(reason.to_string()));

    if inputs.old_roots.state_hash() != inputs.old_state {
        return fail("old state is not the hash of the old roots");
    }
    if inputs.new_roots.state_hash() != inputs.new_state {
        return fail("new state is not the hash of the new roots");
    }
    if inputs.old_state == inputs.new_state {
        return fail("transition does not change the state");
    }
    if inputs.new_state == ZERO_HASH {
        return fail("new state is zero");
    }

    let public_key = EddsaPublicKey::from_bytes(&inputs.auth_public_key)
        .map_err(|e| ProofError::ProofGenerationFailed(format!("auth key: {e}")))?;
    let signature = EddsaSignature::from_slice(&inputs.signature)
        .map_err(|e| ProofError::ProofGenerationFailed(format!("signature: {e}")))?;
    let message = transition_message(&inputs.old_state, &inputs.new_state);
    public_key
        .verify(&message, &signature)
        .map_err(|_| ProofError::ProofGenerationFailed("auth signature does not verify".into()))
}

fn h256(hash: &Hash) -> U256 {
    U256::from_big_endian(hash)
}

fn signals_digest(signals: &[U256]) -> Hash {
    let encoded: Vec<[u8; 32]> = signals
        .iter()
        .map(|s| {
            let mut out = [0u8; 32];
            s.to_big_endian(&mut out);
            out
        })
        .collect();
    let parts: Vec<&[u8]> = encoded.iter().map(|e| e.as_slice()).collect();
    keccak256_many(&parts)
}

/// Build the proof for inputs that satisfy the constraints.
///
/// Deterministic: the same inputs always yield the same proof.
pub fn prove(inputs: &StateTransitionInputs) -> ProofResult<ZkProof> {
    check_constraints(inputs)?;

    let witness = inputs.witness();
    let commitment = WitnessCommitment::commit(&witness);
    let public_signals = inputs.public_signals();
    let signals = signals_digest(&public_signals);

    let challenge_hash = keccak256_many(&[commitment.root().as_slice(), signals.as_slice()]);
    let challenge = FieldElement::from_digest(&challenge_hash);
    let evaluation = evaluate(&witness, challenge);

    let index = (challenge.value() % witness.len() as u64) as usize;
    let opening = commitment
        .open(index)
        .ok_or_else(|| ProofError::ProofGenerationFailed("opening out of range".into()))?;

    let a = [h256(commitment.root()), U256::from(challenge.value())];
    let b = [
        [U256::from(evaluation.value()), U256::from(index as u64)],
        [h256(&opening.leaf), h256(&opening.path_digest())],
    ];
    let mut seal_input = Vec::with_capacity(6 * 32);
    for word in a.iter().chain(b.iter().flatten()) {
        let mut out = [0u8; 32];
        word.to_big_endian(&mut out);
        seal_input.extend_from_slice(&out);
    }
    let seal = keccak256_many(&[seal_input.as_slice(), signals.as_slice()]);
    let c = [h256(&seal), h256(&signals)];

    Ok(ZkProof {
        a,
        b,
        c,
        public_signals,
    })
}

/// Check a native proof against its inputs.
pub fn verify(inputs: &StateTransitionInputs, proof: &ZkProof) -> ProofResult<()> {
    if proof.public_signals != inputs.public_signals() {
        return Err(ProofError::VerificationFailed(
            "public signals do not match inputs".into(),
        ));
    }
    let expected = prove(inputs).map_err(|e| ProofError::VerificationFailed(e.to_string()))?;
    if &expected != proof {
        return Err(ProofError::VerificationFailed("proof does not match witness".into()));
    }
    Ok(())
}
