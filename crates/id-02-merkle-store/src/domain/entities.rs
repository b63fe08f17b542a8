//! Tree addressing, roots and commit batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_crypto::keccak256_many;
use shared_types::{hash_to_hex, Did, Hash, ZERO_HASH};
use std::fmt;

/// Default depth limit of every tree.
pub const DEFAULT_MAX_LEVELS: usize = 40;

/// The three trees backing an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeKind {
    Claims,
    Revocation,
    Roots,
}

impl TreeKind {
    pub const ALL: [TreeKind; 3] = [TreeKind::Claims, TreeKind::Revocation, TreeKind::Roots];

    pub fn as_str(&self) -> &'static str {
        match self {
            TreeKind::Claims => "claims",
            TreeKind::Revocation => "revocation",
            TreeKind::Roots => "roots",
        }
    }

    /// Roots Tree leaf value recording which tree a snapshotted root came from.
    pub fn root_tag(&self) -> Hash {
        let mut tag = ZERO_HASH;
        tag[31] = match self {
            TreeKind::Claims => 1,
            TreeKind::Revocation => 2,
            TreeKind::Roots => 3,
        };
        tag
    }
}

/// Table key prefix of a tree: `(identity, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeId {
    pub identifier: Did,
    pub kind: TreeKind,
}

impl TreeId {
    pub fn new(identifier: Did, kind: TreeKind) -> Self {
        Self { identifier, kind }
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.identifier, self.kind.as_str())
    }
}

/// Current roots of an identity's three trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreeRoots {
    pub claims: Hash,
    pub revocation: Hash,
    pub roots: Hash,
}

impl TreeRoots {
    pub fn get(&self, kind: TreeKind) -> Hash {
        match kind {
            TreeKind::Claims => self.claims,
            TreeKind::Revocation => self.revocation,
            TreeKind::Roots => self.roots,
        }
    }

    pub fn set(&mut self, kind: TreeKind, root: Hash) {
        match kind {
            TreeKind::Claims => self.claims = root,
            TreeKind::Revocation => self.revocation = root,
            TreeKind::Roots => self.roots = root,
        }
    }

    /// Composite identity state: `keccak(claims || revocation || roots)`.
    pub fn state_hash(&self) -> Hash {
        state_hash(&self.claims, &self.revocation, &self.roots)
    }
}

pub fn state_hash(claims: &Hash, revocation: &Hash, roots: &Hash) -> Hash {
    keccak256_many(&[claims.as_slice(), revocation.as_slice(), roots.as_slice()])
}

/// What a tree mutation did, for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeOperation {
    AddClaim { index: Hash },
    Revoke { nonce: u64 },
    SnapshotRoot { root: Hash, source: TreeKind },
}

/// Audit record written atomically with the mutation it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeAuditRecord {
    pub tree: TreeId,
    pub old_root: Hash,
    pub new_root: Hash,
    pub operation: TreeOperation,
    pub recorded_at: DateTime<Utc>,
}

impl fmt::Display for TreeAuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} ({:?})",
            self.tree,
            hash_to_hex(&self.old_root),
            hash_to_hex(&self.new_root),
            self.operation
        )
    }
}

/// Compare-and-set of a tree's root pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootUpdate {
    pub tree: TreeId,
    pub expected: Hash,
    pub new_root: Hash,
}

/// Everything one tree transaction writes. Committed all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct TreeBatch {
    pub nodes: Vec<(TreeId, Hash, Vec<u8>)>,
    pub roots: Vec<RootUpdate>,
    pub audit: Vec<TreeAuditRecord>,
}

impl TreeBatch {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_hash_depends_on_every_root() {
        let base = TreeRoots {
            claims: [1u8; 32],
            revocation: [2u8; 32],
            roots: [3u8; 32],
        };
        for kind in TreeKind::ALL {
            let mut changed = base;
            changed.set(kind, [9u8; 32]);
            assert_ne!(changed.state_hash(), base.state_hash(), "{kind:?}");
        }
    }

    #[test]
    fn test_tree_id_display() {
        let did = Did::new("iden3", "polygon", "amoy", "abc").unwrap();
        let id = TreeId::new(did, TreeKind::Revocation);
        assert_eq!(id.to_string(), "did:iden3:polygon:amoy:abc/revocation");
    }
}
