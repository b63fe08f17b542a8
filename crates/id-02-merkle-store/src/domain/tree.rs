//! # Compact Sparse Merkle Tree
//!
//! A leaf sits at the shallowest level where its path no longer collides
//! with another leaf. Insertion pushes an existing leaf down until the two
//! paths diverge, creating middle nodes with empty siblings on the way.
//!
//! The resulting root depends only on the set of `(key, value)` pairs, not
//! on insertion order.

use super::{path_bit, MerkleError, MerkleProof, MerkleResult, Node, TreeId};
use shared_types::{Hash, ZERO_HASH};

/// Node lookup by hash.
pub trait NodeReader {
    fn tree(&self) -> &TreeId;

    /// Load the node addressed by `hash`. [`ZERO_HASH`] is always `Empty`.
    fn load(&self, hash: &Hash) -> MerkleResult<Node>;
}

/// Node staging for mutations.
pub trait NodeWriter: NodeReader {
    /// Stage `node` for commit and return its hash.
    fn stage(&mut self, node: Node) -> Hash;
}

/// Tree algorithms over a node arena rooted at `root`.
pub struct SparseMerkleTree<A> {
    access: A,
    root: Hash,
    max_levels: usize,
}

impl<A: NodeReader> SparseMerkleTree<A> {
    pub fn new(access: A, root: Hash, max_levels: usize) -> Self {
        Self {
            access,
            root,
            max_levels,
        }
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn into_access(self) -> A {
        self.access
    }

    /// Value stored under `key`, if any.
    pub fn get(&self, key: &Hash) -> MerkleResult<Option<Hash>> {
        let mut current = self.root;
        for level in 0..self.max_levels {
            match self.access.load(&current)? {
                Node::Empty => return Ok(None),
                Node::Leaf { key: k, value } => return Ok((k == *key).then_some(value)),
                Node::Middle { left, right } => {
                    current = if path_bit(key, level) { right } else { left };
                }
            }
        }
        Err(MerkleError::MaxLevelsReached {
            max_levels: self.max_levels,
        })
    }

    /// Existence or non-existence proof for `key` against the current root.
    pub fn generate_proof(&self, key: &Hash) -> MerkleResult<MerkleProof> {
        let mut siblings = Vec::new();
        let mut current = self.root;
        for level in 0..self.max_levels {
            match self.access.load(&current)? {
                Node::Empty => {
                    return Ok(MerkleProof::non_existence(siblings, None));
                }
                Node::Leaf { key: k, value } => {
                    if k == *key {
                        return Ok(MerkleProof::existence(siblings, value));
                    }
                    return Ok(MerkleProof::non_existence(siblings, Some((k, value))));
                }
                Node::Middle { left, right } => {
                    if path_bit(key, level) {
                        siblings.push(left);
                        current = right;
                    } else {
                        siblings.push(right);
                        current = left;
                    }
                }
            }
        }
        Err(MerkleError::MaxLevelsReached {
            max_levels: self.max_levels,
        })
    }

    /// Walk every node, checking each one hashes to its address.
    ///
    /// Returns the number of leaves.
    pub fn verify_integrity(&self) -> MerkleResult<usize> {
        let mut leaves = 0;
        let mut stack = vec![(self.root, 0usize)];
        while let Some((hash, level)) = stack.pop() {
            if level > self.max_levels {
                return Err(MerkleError::TreeCorruption {
                    tree: self.access.tree().clone(),
                    reason: format!("path deeper than {} levels", self.max_levels),
                });
            }
            match self.access.load(&hash)? {
                Node::Empty => {}
                Node::Leaf { .. } => leaves += 1,
                Node::Middle { left, right } => {
                    stack.push((left, level + 1));
                    stack.push((right, level + 1));
                }
            }
        }
        Ok(leaves)
    }
}

impl<A: NodeWriter> SparseMerkleTree<A> {
    /// Insert a new leaf. Existing keys are rejected, never overwritten.
    pub fn add(&mut self, key: Hash, value: Hash) -> MerkleResult<Hash> {
        let leaf = Node::Leaf { key, value };
        self.root = self.add_leaf(self.root, leaf, &key, 0)?;
        Ok(self.root)
    }

    fn add_leaf(&mut self, at: Hash, leaf: Node, key: &Hash, level: usize) -> MerkleResult<Hash> {
        if level >= self.max_levels {
            return Err(MerkleError::MaxLevelsReached {
                max_levels: self.max_levels,
            });
        }
        match self.access.load(&at)? {
            Node::Empty => Ok(self.access.stage(leaf)),
            Node::Leaf {
                key: old_key,
                value: old_value,
            } => {
                if old_key == *key {
                    return Err(MerkleError::EntryExists {
                        tree: self.access.tree().clone(),
                        key: hex::encode(key),
                    });
                }
                let old = Node::Leaf {
                    key: old_key,
                    value: old_value,
                };
                self.push_leaf(leaf, key, old, &old_key, level)
            }
            Node::Middle { left, right } => {
                let middle = if path_bit(key, level) {
                    let right = self.add_leaf(right, leaf, key, level + 1)?;
                    Node::Middle { left, right }
                } else {
                    let left = self.add_leaf(left, leaf, key, level + 1)?;
                    Node::Middle { left, right }
                };
                Ok(self.access.stage(middle))
            }
        }
    }

    /// Push `old` down until its path diverges from `new`'s.
    fn push_leaf(
        &mut self,
        new: Node,
        new_key: &Hash,
        old: Node,
        old_key: &Hash,
        level: usize,
    ) -> MerkleResult<Hash> {
        if level + 1 >= self.max_levels {
            return Err(MerkleError::MaxLevelsReached {
                max_levels: self.max_levels,
            });
        }
        let new_bit = path_bit(new_key, level);
        let middle = if new_bit == path_bit(old_key, level) {
            let child = self.push_leaf(new, new_key, old, old_key, level + 1)?;
            if new_bit {
                Node::Middle {
                    left: ZERO_HASH,
                    right: child,
                }
            } else {
                Node::Middle {
                    left: child,
                    right: ZERO_HASH,
                }
            }
        } else {
            let new_hash = self.access.stage(new);
            let old_hash = old.hash();
            if new_bit {
                Node::Middle {
                    left: old_hash,
                    right: new_hash,
                }
            } else {
                Node::Middle {
                    left: new_hash,
                    right: old_hash,
                }
            }
        };
        Ok(self.access.stage(middle))
    }
}
