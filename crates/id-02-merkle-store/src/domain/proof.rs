//! # Merkle Proofs
//!
//! Proofs of presence or absence of a key, verifiable by anyone holding a
//! historical root.
//!
//! A non-existence proof either ends in an empty subtree or in a different
//! leaf (`node_aux`) occupying the key's path prefix.

use super::{leaf_hash, middle_hash, path_bit};
use serde::{Deserialize, Serialize};
use shared_types::{Hash, ZERO_HASH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub existence: bool,
    /// Sibling hashes from the root downwards.
    pub siblings: Vec<Hash>,
    /// Value under the key when `existence` is true.
    pub value: Option<Hash>,
    /// Leaf found on the key's path when `existence` is false.
    pub node_aux: Option<(Hash, Hash)>,
}

impl MerkleProof {
    pub fn existence(siblings: Vec<Hash>, value: Hash) -> Self {
        Self {
            existence: true,
            siblings,
            value: Some(value),
            node_aux: None,
        }
    }

    pub fn non_existence(siblings: Vec<Hash>, node_aux: Option<(Hash, Hash)>) -> Self {
        Self {
            existence: false,
            siblings,
            value: None,
            node_aux,
        }
    }

    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Check the proof for `key` against `root`.
    pub fn verify(&self, root: &Hash, key: &Hash) -> bool {
        let start = if self.existence {
            match self.value {
                Some(value) => leaf_hash(key, &value),
                None => return false,
            }
        } else {
            match self.node_aux {
                Some((aux_key, aux_value)) => {
                    if aux_key == *key {
                        return false;
                    }
                    // The aux leaf must actually sit on the key's path.
                    let shares_prefix = (0..self.siblings.len())
                        .all(|level| path_bit(&aux_key, level) == path_bit(key, level));
                    if !shares_prefix {
                        return false;
                    }
                    leaf_hash(&aux_key, &aux_value)
                }
                None => ZERO_HASH,
            }
        };
        self.root_from(start, key) == *root
    }

    fn root_from(&self, start: Hash, key: &Hash) -> Hash {
        let mut current = start;
        for (level, sibling) in self.siblings.iter().enumerate().rev() {
            current = if path_bit(key, level) {
                middle_hash(sibling, &current)
            } else {
                middle_hash(&current, sibling)
            };
        }
        current
    }
}
