//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Keys**: `KeyType`, `KeyId`
//! - **Identity**: `Identity`, `IdentityState`, `StateStatus`
//! - **Credentials**: `Claim`, `Revocation`

use crate::did::Did;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

/// A 32-byte hash (Keccak-256 unless stated otherwise).
pub type Hash = [u8; 32];

/// A 20-byte Ethereum address.
pub type Address = [u8; 20];

/// Hash of an empty sparse Merkle tree.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Hex-encode a hash with a `0x` prefix.
pub fn hash_to_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Short hex form for log lines.
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}

// =============================================================================
// CLUSTER A: KEYS
// =============================================================================

/// Signing-algorithm family of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyType {
    /// Identity key signing state transitions inside the circuit.
    #[serde(rename = "BJJ")]
    BabyJubJub,
    /// secp256k1 key signing blockchain transactions.
    #[serde(rename = "ETH")]
    Ethereum,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::BabyJubJub => "BJJ",
            KeyType::Ethereum => "ETH",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BJJ" | "BabyJubJub" => Ok(KeyType::BabyJubJub),
            "ETH" | "Ethereum" => Ok(KeyType::Ethereum),
            other => Err(format!("unknown key type: {other}")),
        }
    }
}

/// Opaque reference to a key held by a signing provider.
///
/// `id` is either scoped to a DID (`<did>/<type>:<pubkey>`) or a shared key
/// path such as the publishing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId {
    pub key_type: KeyType,
    pub id: String,
}

impl KeyId {
    pub fn new(key_type: KeyType, id: impl Into<String>) -> Self {
        Self {
            key_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.key_type, self.id)
    }
}

// =============================================================================
// CLUSTER B: IDENTITY & STATE
// =============================================================================

/// An issuer identity. Never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub identifier: Did,
    /// BabyJubJub key that signs this identity's state transitions.
    pub auth_key: KeyId,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Publication status of an identity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStatus {
    /// Trees mutated, not yet on chain.
    Pending,
    /// Transaction submitted, awaiting confirmation.
    Transacted,
    /// Confirmed at the configured depth.
    Confirmed,
    /// Attempt abandoned; retried by a later cycle.
    Failed,
}

impl StateStatus {
    /// At most one in-flight state may exist per identity.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, StateStatus::Pending | StateStatus::Transacted)
    }
}

impl fmt::Display for StateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateStatus::Pending => "pending",
            StateStatus::Transacted => "transacted",
            StateStatus::Confirmed => "confirmed",
            StateStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One state of an identity: old root → new root plus publication status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityState {
    pub state_id: Uuid,
    pub identifier: Did,
    /// State hash of the last confirmed state this one builds on.
    /// `None` only for the genesis state.
    pub previous_state: Option<Hash>,
    /// Composite hash of the three tree roots.
    pub state: Hash,
    pub claims_tree_root: Hash,
    pub revocation_tree_root: Hash,
    pub roots_tree_root: Hash,
    pub status: StateStatus,
    pub tx_hash: Option<Hash>,
    pub tx_nonce: Option<u64>,
    pub gas_price: Option<U256>,
    pub block_number: Option<u64>,
    pub failure_reason: Option<String>,
    /// Number of publication attempts started for this state.
    pub attempt: u32,
    /// Worker lease; a live lease means a publication is in flight.
    pub lease_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl IdentityState {
    pub fn is_genesis(&self) -> bool {
        self.previous_state.is_none()
    }

    /// Whether a worker currently holds this state's lease.
    pub fn lease_active(&self, now: DateTime<Utc>) -> bool {
        self.lease_until.is_some_and(|until| until > now)
    }
}

// =============================================================================
// CLUSTER C: CREDENTIALS
// =============================================================================

/// Lifecycle of a claim relative to the Claims Tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    /// Recorded, not yet part of any tree root.
    Pending,
    /// Added to the Claims Tree as part of a state.
    Included,
}

/// An issued credential leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub identifier: Did,
    pub schema_hash: Hash,
    /// Tree key, derived from the schema and data hash.
    pub index_hash: Hash,
    /// Tree value.
    pub value_hash: Hash,
    pub rev_nonce: u64,
    pub status: ClaimStatus,
    /// State in which the claim entered the Claims Tree.
    pub included_in: Option<Hash>,
    pub created_at: DateTime<Utc>,
}

/// A pending or applied revocation of a claim nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub identifier: Did,
    pub nonce: u64,
    pub status: ClaimStatus,
    pub included_in: Option<Hash>,
    pub created_at: DateTime<Utc>,
}
