//! # ID-02 Merkle State Store
//!
//! The three sparse Merkle trees backing every identity's state.
//!
//! **Subsystem ID:** 02
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Trees
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | Claims | claim index hash | claim value hash |
//! | Revocation | revocation nonce | zero |
//! | Roots | a Claims or Revocation root | source tree tag |
//!
//! The identity state is `keccak(claimsRoot || revocationRoot || rootsRoot)`.
//!
//! ## Storage
//!
//! Nodes live in a flat table keyed by `(tree, node hash)`. Every node is
//! re-hashed on load; a mismatch or a dangling reference surfaces as
//! [`MerkleError::TreeCorruption`] and is never repaired automatically.
//!
//! Nodes are never deleted, so proofs against historical roots remain
//! valid and concurrent readers never observe a partial write.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryTreeDb, TreeTables};
pub use domain::{
    state_hash, MerkleError, MerkleProof, MerkleResult, RootUpdate, TreeAuditRecord, TreeBatch,
    TreeId, TreeKind, TreeOperation, TreeRoots, DEFAULT_MAX_LEVELS,
};
pub use ports::TreeStorage;
pub use service::{nonce_key, IdentityTrees, MerkleStateStore, TreeConfig};
