//! Domain layer: nodes, tree algorithms, proofs.

pub mod entities;
pub mod errors;
pub mod node;
pub mod proof;
pub mod tree;

pub use entities::*;
pub use errors::{MerkleError, MerkleResult};
pub use node::{leaf_hash, middle_hash, path_bit, Node};
pub use proof::MerkleProof;
pub use tree::{NodeReader, NodeWriter, SparseMerkleTree};
