//! Transition records passed between the engine, storage and publisher.

use id_02_merkle_store::{TreeBatch, TreeRoots};
use serde::{Deserialize, Serialize};
use shared_crypto::keccak256_many;
use shared_types::{Claim, Did, Hash, Identity, IdentityState};
use uuid::Uuid;

/// Result of asking the engine for the next transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// Nothing to publish. Carries the latest state, if any.
    NoPendingChanges(Option<IdentityState>),
    /// A new pending state was committed together with its tree mutations.
    Created(IdentityState),
    /// A failed state was reopened unchanged for resubmission.
    Reopened(IdentityState),
}

impl TransitionOutcome {
    /// The state to publish, if there is one.
    pub fn publishable(&self) -> Option<&IdentityState> {
        match self {
            TransitionOutcome::NoPendingChanges(_) => None,
            TransitionOutcome::Created(state) | TransitionOutcome::Reopened(state) => Some(state),
        }
    }
}

/// Everything one transition writes, committed atomically and only if the
/// identity has no in-flight state.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub trees: TreeBatch,
    pub state: IdentityState,
    pub included_claims: Vec<Uuid>,
    pub included_revocations: Vec<u64>,
}

/// Everything identity provisioning writes.
#[derive(Debug, Clone)]
pub struct IdentityGenesis {
    pub identity: Identity,
    pub state: IdentityState,
    pub auth_claim: Claim,
    pub trees: TreeBatch,
}

/// A state transition authorized by the identity's auth key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransition {
    pub identifier: Did,
    pub old_state: Hash,
    pub old_roots: TreeRoots,
    pub new_state: Hash,
    pub new_roots: TreeRoots,
    pub is_old_state_genesis: bool,
    pub auth_public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Message signed by the auth key: `keccak(old_state || new_state)`.
pub fn transition_message(old_state: &Hash, new_state: &Hash) -> Hash {
    keccak256_many(&[old_state.as_slice(), new_state.as_slice()])
}

/// Roots recorded on a state.
pub fn roots_of(state: &IdentityState) -> TreeRoots {
    TreeRoots {
        claims: state.claims_tree_root,
        revocation: state.revocation_tree_root,
        roots: state.roots_tree_root,
    }
}
