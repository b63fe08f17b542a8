//! Inputs of the state-transition circuit.

use super::field::{limbs_of_bytes, limbs_of_u256, FieldElement};
use id_02_merkle_store::TreeRoots;
use id_03_identity_state::SignedTransition;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use shared_types::{Did, Hash};

/// Everything the prover needs for one transition.
///
/// `user_id`, `old_state`, `new_state` and `is_old_state_genesis` are the
/// public signals; the rest is private witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransitionInputs {
    pub identifier: Did,
    pub user_id: U256,
    pub old_state: Hash,
    pub new_state: Hash,
    pub is_old_state_genesis: bool,
    pub old_roots: TreeRoots,
    pub new_roots: TreeRoots,
    pub auth_public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl StateTransitionInputs {
    pub fn from_signed(signed: &SignedTransition) -> Self {
        Self {
            identifier: signed.identifier.clone(),
            user_id: signed.identifier.numeric_id(),
            old_state: signed.old_state,
            new_state: signed.new_state,
            is_old_state_genesis: signed.is_old_state_genesis,
            old_roots: signed.old_roots,
            new_roots: signed.new_roots,
            auth_public_key: signed.auth_public_key.clone(),
            signature: signed.signature.clone(),
        }
    }

    /// Public signals in contract order.
    pub fn public_signals(&self) -> Vec<U256> {
        vec![
            self.user_id,
            U256::from_big_endian(&self.old_state),
            U256::from_big_endian(&self.new_state),
            U256::from(self.is_old_state_genesis as u8),
        ]
    }

    /// Full witness: public signals first, then the six roots.
    pub fn witness(&self) -> Vec<FieldElement> {
        let mut witness = Vec::with_capacity(8 * 9 + 1);
        witness.extend(limbs_of_u256(self.user_id));
        witness.extend(limbs_of_bytes(&self.old_state));
        witness.extend(limbs_of_bytes(&self.new_state));
        witness.push(FieldElement::from_bool(self.is_old_state_genesis));
        for roots in [&self.old_roots, &self.new_roots] {
            witness.extend(limbs_of_bytes(&roots.claims));
            witness.extend(limbs_of_bytes(&roots.revocation));
            witness.extend(limbs_of_bytes(&roots.roots));
        }
        witness
    }

    /// JSON body understood by the remote proving service.
    pub fn to_circuit_json(&self) -> serde_json::Value {
        let dec = |h: &Hash| U256::from_big_endian(h).to_string();
        serde_json::json!({
            "userID": self.user_id.to_string(),
            "oldUserState": dec(&self.old_state),
            "newUserState": dec(&self.new_state),
            "isOldStateGenesis": if self.is_old_state_genesis { "1" } else { "0" },
            "claimsTreeRoot": dec(&self.old_roots.claims),
            "revTreeRoot": dec(&self.old_roots.revocation),
            "rootsTreeRoot": dec(&self.old_roots.roots),
            "newClaimsTreeRoot": dec(&self.new_roots.claims),
            "newRevTreeRoot": dec(&self.new_roots.revocation),
            "newRootsTreeRoot": dec(&self.new_roots.roots),
            "authPublicKey": hex::encode(&self.auth_public_key),
            "signature": hex::encode(&self.signature),
        })
    }
}
