//! Sparse Merkle tree nodes.
//!
//! Nodes are stored arena-by-hash: a node's identity is its Keccak hash and
//! children are referenced by hash. The empty subtree is [`ZERO_HASH`] and
//! is never stored.

use super::{MerkleError, MerkleResult};
use shared_crypto::KeccakHasher;
use shared_types::{Hash, ZERO_HASH};

const TAG_LEAF: u8 = 0x01;
const TAG_MIDDLE: u8 = 0x02;
const ENCODED_LEN: usize = 1 + 32 + 32;

/// Node of a compact sparse Merkle tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Empty,
    Leaf { key: Hash, value: Hash },
    Middle { left: Hash, right: Hash },
}

impl Node {
    /// Hash of the node. Leaves and middles are domain-separated.
    pub fn hash(&self) -> Hash {
        match self {
            Node::Empty => ZERO_HASH,
            Node::Leaf { key, value } => leaf_hash(key, value),
            Node::Middle { left, right } => middle_hash(left, right),
        }
    }

    /// `tag || a || b`. Empty nodes have no encoding.
    pub fn encode(&self) -> Vec<u8> {
        let (tag, a, b) = match self {
            Node::Empty => return Vec::new(),
            Node::Leaf { key, value } => (TAG_LEAF, key, value),
            Node::Middle { left, right } => (TAG_MIDDLE, left, right),
        };
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.push(tag);
        out.extend_from_slice(a);
        out.extend_from_slice(b);
        out
    }

    pub fn decode(bytes: &[u8]) -> MerkleResult<Self> {
        if bytes.is_empty() {
            return Ok(Node::Empty);
        }
        if bytes.len() != ENCODED_LEN {
            return Err(MerkleError::MalformedNode(format!(
                "expected {ENCODED_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a.copy_from_slice(&bytes[1..33]);
        b.copy_from_slice(&bytes[33..65]);
        match bytes[0] {
            TAG_LEAF => Ok(Node::Leaf { key: a, value: b }),
            TAG_MIDDLE => Ok(Node::Middle { left: a, right: b }),
            tag => Err(MerkleError::MalformedNode(format!("unknown tag {tag:#04x}"))),
        }
    }
}

pub fn leaf_hash(key: &Hash, value: &Hash) -> Hash {
    let mut hasher = KeccakHasher::new();
    hasher.update(&[TAG_LEAF]).update(key).update(value);
    hasher.finalize()
}

pub fn middle_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = KeccakHasher::new();
    hasher.update(&[TAG_MIDDLE]).update(left).update(right);
    hasher.finalize()
}

/// Path bit at `level`, least-significant bit first.
///
/// Keys are big-endian, so small integer keys (revocation nonces) still
/// spread across both subtrees from the root.
pub fn path_bit(key: &Hash, level: usize) -> bool {
    let byte = key[31 - level / 8];
    (byte >> (level % 8)) & 1 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let leaf = Node::Leaf {
            key: [1u8; 32],
            value: [2u8; 32],
        };
        assert_eq!(Node::decode(&leaf.encode()).unwrap(), leaf);
        assert_eq!(Node::decode(&[]).unwrap(), Node::Empty);
        assert!(Node::decode(&[0x07; 65]).is_err());
        assert!(Node::decode(&[0x01; 10]).is_err());
    }

    #[test]
    fn test_leaf_and_middle_are_domain_separated() {
        let a = [3u8; 32];
        let b = [4u8; 32];
        assert_ne!(leaf_hash(&a, &b), middle_hash(&a, &b));
        assert_eq!(Node::Empty.hash(), ZERO_HASH);
    }

    #[test]
    fn test_path_bits_lsb_first() {
        let mut key = [0u8; 32];
        key[31] = 0b0000_0101;
        assert!(path_bit(&key, 0));
        assert!(!path_bit(&key, 1));
        assert!(path_bit(&key, 2));
        key[30] = 0b1000_0000;
        assert!(path_bit(&key, 15));
    }
}
