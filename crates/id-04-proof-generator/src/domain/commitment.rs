//! # Witness Commitment
//!
//! Binary Keccak Merkle commitment over field elements. Odd layers are
//! padded with the zero hash.

use super::field::FieldElement;
use shared_crypto::keccak256_many;
use shared_types::{Hash, ZERO_HASH};

/// Merkle commitment to a vector of field elements.
#[derive(Clone, Debug)]
pub struct WitnessCommitment {
    root: Hash,
    leaves: Vec<Hash>,
}

impl WitnessCommitment {
    pub fn commit(values: &[FieldElement]) -> Self {
        let leaves: Vec<Hash> = values.iter().map(hash_element).collect();
        let root = match leaves.len() {
            0 => ZERO_HASH,
            1 => leaves[0],
            _ => {
                let mut layer = leaves.clone();
                while layer.len() > 1 {
                    layer = next_layer(&layer);
                }
                layer[0]
            }
        };
        Self { root, leaves }
    }

    pub fn root(&self) -> &Hash {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Opening proof for the leaf at `index`.
    pub fn open(&self, index: usize) -> Option<Opening> {
        if index >= self.leaves.len() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut position = index;
        let mut layer = self.leaves.clone();
        while layer.len() > 1 {
            if layer.len() % 2 == 1 {
                layer.push(ZERO_HASH);
            }
            siblings.push(layer[position ^ 1]);
            layer = next_layer(&layer);
            position /= 2;
        }

        Some(Opening {
            leaf: self.leaves[index],
            index,
            siblings,
        })
    }
}

/// Path from one committed leaf to the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opening {
    pub leaf: Hash,
    pub index: usize,
    pub siblings: Vec<Hash>,
}

impl Opening {
    pub fn verify(&self, root: &Hash) -> bool {
        let mut current = self.leaf;
        let mut position = self.index;
        for sibling in &self.siblings {
            current = if position % 2 == 0 {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
            position /= 2;
        }
        &current == root
    }

    /// Digest of the sibling path.
    pub fn path_digest(&self) -> Hash {
        let parts: Vec<&[u8]> = self.siblings.iter().map(|s| s.as_slice()).collect();
        keccak256_many(&parts)
    }
}

fn next_layer(layer: &[Hash]) -> Vec<Hash> {
    layer
        .chunks(2)
        .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&ZERO_HASH)))
        .collect()
}

pub fn hash_element(element: &FieldElement) -> Hash {
    keccak256_many(&[&[0x00u8][..], &element.value().to_be_bytes()[..]])
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    keccak256_many(&[&[0x01u8][..], left.as_slice(), right.as_slice()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements(n: u64) -> Vec<FieldElement> {
        (1..=n).map(FieldElement::new).collect()
    }

    #[test]
    fn test_every_leaf_opens() {
        for n in [1, 2, 3, 5, 8] {
            let commitment = WitnessCommitment::commit(&elements(n));
            for i in 0..n as usize {
                let opening = commitment.open(i).unwrap();
                assert!(opening.verify(commitment.root()), "n={n} i={i}");
            }
            assert!(commitment.open(n as usize).is_none());
        }
    }

    #[test]
    fn test_tampered_leaf_rejected() {
        let commitment = WitnessCommitment::commit(&elements(4));
        let mut opening = commitment.open(2).unwrap();
        opening.leaf = [0xFF; 32];
        assert!(!opening.verify(commitment.root()));
    }

    #[test]
    fn test_empty_commitment() {
        let commitment = WitnessCommitment::commit(&[]);
        assert_eq!(commitment.root(), &ZERO_HASH);
        assert!(commitment.is_empty());
    }
}
