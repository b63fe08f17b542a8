//! In-memory tree tables.
//!
//! [`TreeTables`] is plain data plus the batch-apply logic, so any storage
//! that keeps trees next to other records (e.g. identity states) can embed
//! it and commit both under one lock.

use crate::domain::{MerkleError, MerkleResult, TreeAuditRecord, TreeBatch, TreeId};
use crate::ports::TreeStorage;
use shared_types::{Did, Hash, ZERO_HASH};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default, Clone)]
pub struct TreeTables {
    nodes: HashMap<(TreeId, Hash), Vec<u8>>,
    roots: HashMap<TreeId, Hash>,
    audit: Vec<TreeAuditRecord>,
}

impl TreeTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, tree: &TreeId, hash: &Hash) -> Option<Vec<u8>> {
        self.nodes.get(&(tree.clone(), *hash)).cloned()
    }

    pub fn root(&self, tree: &TreeId) -> Option<Hash> {
        self.roots.get(tree).copied()
    }

    /// Check every root precondition of `batch`.
    pub fn check(&self, batch: &TreeBatch) -> MerkleResult<()> {
        for update in &batch.roots {
            let current = self.root(&update.tree).unwrap_or(ZERO_HASH);
            if current != update.expected {
                return Err(MerkleError::ConcurrentUpdate {
                    tree: update.tree.clone(),
                });
            }
        }
        Ok(())
    }

    /// Apply a batch whose preconditions were already checked.
    pub fn apply(&mut self, batch: TreeBatch) {
        for (tree, hash, bytes) in batch.nodes {
            self.nodes.insert((tree, hash), bytes);
        }
        for update in batch.roots {
            self.roots.insert(update.tree, update.new_root);
        }
        self.audit.extend(batch.audit);
    }

    pub fn audit_log(&self, identifier: &Did) -> Vec<TreeAuditRecord> {
        self.audit
            .iter()
            .filter(|r| &r.tree.identifier == identifier)
            .cloned()
            .collect()
    }

    /// Overwrite a stored node. Only for corruption tests.
    pub fn tamper(&mut self, tree: &TreeId, hash: &Hash, bytes: Vec<u8>) {
        self.nodes.insert((tree.clone(), *hash), bytes);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// In-memory implementation of TreeStorage for testing
#[derive(Default)]
pub struct InMemoryTreeDb {
    tables: RwLock<TreeTables>,
}

impl InMemoryTreeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tamper(&self, tree: &TreeId, hash: &Hash, bytes: Vec<u8>) -> MerkleResult<()> {
        let mut tables = self.tables.write().map_err(|_| lock_poisoned())?;
        tables.tamper(tree, hash, bytes);
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.tables.read().map(|t| t.node_count()).unwrap_or(0)
    }
}

fn lock_poisoned() -> MerkleError {
    MerkleError::Storage(shared_types::StorageError::DatabaseError(
        "tree table lock poisoned".into(),
    ))
}

impl TreeStorage for InMemoryTreeDb {
    fn get_node(&self, tree: &TreeId, hash: &Hash) -> MerkleResult<Option<Vec<u8>>> {
        let tables = self.tables.read().map_err(|_| lock_poisoned())?;
        Ok(tables.node(tree, hash))
    }

    fn get_root(&self, tree: &TreeId) -> MerkleResult<Option<Hash>> {
        let tables = self.tables.read().map_err(|_| lock_poisoned())?;
        Ok(tables.root(tree))
    }

    fn commit(&self, batch: TreeBatch) -> MerkleResult<()> {
        let mut tables = self.tables.write().map_err(|_| lock_poisoned())?;
        tables.check(&batch)?;
        tables.apply(batch);
        Ok(())
    }

    fn audit_log(&self, identifier: &Did) -> MerkleResult<Vec<TreeAuditRecord>> {
        let tables = self.tables.read().map_err(|_| lock_poisoned())?;
        Ok(tables.audit_log(identifier))
    }
}
