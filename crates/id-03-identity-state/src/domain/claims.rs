//! Claim leaf derivation.
//!
//! ```text
//! data_hash = keccak(data)
//! index     = keccak(schema_hash || data_hash)
//! value     = keccak(data_hash || rev_nonce_be)
//! ```

use chrono::Utc;
use shared_crypto::{keccak256, keccak256_many};
use shared_types::{Claim, ClaimStatus, Did, Hash};
use uuid::Uuid;

/// Revocation nonce reserved for the auth claim.
pub const AUTH_CLAIM_NONCE: u64 = 0;

/// Schema hash of the BabyJubJub auth claim.
pub fn auth_schema_hash() -> Hash {
    keccak256(b"iden3:auth-bjj-credential")
}

pub fn claim_index(schema_hash: &Hash, data: &[u8]) -> Hash {
    let data_hash = keccak256(data);
    keccak256_many(&[schema_hash.as_slice(), data_hash.as_slice()])
}

pub fn claim_value(data: &[u8], rev_nonce: u64) -> Hash {
    let data_hash = keccak256(data);
    keccak256_many(&[data_hash.as_slice(), &rev_nonce.to_be_bytes()])
}

/// A pending claim for `identifier`.
pub fn new_claim(identifier: &Did, schema_hash: Hash, data: &[u8], rev_nonce: u64) -> Claim {
    Claim {
        id: Uuid::new_v4(),
        identifier: identifier.clone(),
        schema_hash,
        index_hash: claim_index(&schema_hash, data),
        value_hash: claim_value(data, rev_nonce),
        rev_nonce,
        status: ClaimStatus::Pending,
        included_in: None,
        created_at: Utc::now(),
    }
}

/// Auth claim binding the identity to its BabyJubJub public key.
pub fn auth_claim(identifier: &Did, public_key: &[u8]) -> Claim {
    new_claim(identifier, auth_schema_hash(), public_key, AUTH_CLAIM_NONCE)
}
