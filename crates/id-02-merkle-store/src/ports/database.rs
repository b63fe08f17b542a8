use crate::domain::{MerkleResult, TreeAuditRecord, TreeBatch, TreeId};
use shared_types::{Did, Hash};

/// Flat node table keyed by `(tree, node hash)` plus per-tree root pointers.
pub trait TreeStorage: Send + Sync {
    /// Raw node bytes. `None` if the node was never written.
    fn get_node(&self, tree: &TreeId, hash: &Hash) -> MerkleResult<Option<Vec<u8>>>;

    /// Committed root of `tree`. `None` until the first mutation.
    fn get_root(&self, tree: &TreeId) -> MerkleResult<Option<Hash>>;

    /// Apply nodes, root pointer swaps and audit records atomically.
    ///
    /// Fails with `ConcurrentUpdate` without writing anything if any root
    /// no longer has its expected value.
    fn commit(&self, batch: TreeBatch) -> MerkleResult<()>;

    /// Audit trail of an identity's trees, oldest first.
    fn audit_log(&self, identifier: &Did) -> MerkleResult<Vec<TreeAuditRecord>>;
}
