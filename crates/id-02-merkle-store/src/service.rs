//! # Merkle State Store
//!
//! Per-identity Claims, Revocation and Roots trees over a [`TreeStorage`].
//!
//! Every mutation goes through an [`IdentityTrees`] transaction: nodes are
//! staged in memory and only reach storage through a single
//! [`TreeStorage::commit`] together with the root swaps and audit records.
//! The one-shot operations on [`MerkleStateStore`] each run their own
//! transaction; the state engine stages a whole transition in one.

use crate::domain::{
    MerkleError, MerkleProof, MerkleResult, Node, NodeReader, NodeWriter, RootUpdate,
    SparseMerkleTree, TreeAuditRecord, TreeBatch, TreeId, TreeKind, TreeOperation, TreeRoots,
    DEFAULT_MAX_LEVELS,
};
use crate::ports::TreeStorage;
use chrono::Utc;
use shared_types::{short_hex, Did, Hash, ZERO_HASH};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Tree parameters.
#[derive(Debug, Clone, Copy)]
pub struct TreeConfig {
    pub max_levels: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_levels: DEFAULT_MAX_LEVELS,
        }
    }
}

/// Revocation Tree key for a claim revocation nonce.
pub fn nonce_key(nonce: u64) -> Hash {
    let mut key = ZERO_HASH;
    key[24..].copy_from_slice(&nonce.to_be_bytes());
    key
}

/// Decode stored bytes, checking the node hashes to its address.
fn decode_checked(tree: &TreeId, hash: &Hash, bytes: Option<Vec<u8>>) -> MerkleResult<Node> {
    let bytes = bytes.ok_or_else(|| MerkleError::TreeCorruption {
        tree: tree.clone(),
        reason: format!("missing node {}", short_hex(hash)),
    })?;
    let node = Node::decode(&bytes).map_err(|e| MerkleError::TreeCorruption {
        tree: tree.clone(),
        reason: e.to_string(),
    })?;
    if node.hash() != *hash {
        error!(tree = %tree, node = %short_hex(hash), "[id-02] Node hash mismatch");
        return Err(MerkleError::TreeCorruption {
            tree: tree.clone(),
            reason: format!("node {} does not hash to its address", short_hex(hash)),
        });
    }
    Ok(node)
}

/// Read-only view of committed nodes.
struct CommittedNodes<'a, S: ?Sized> {
    storage: &'a S,
    tree: TreeId,
}

impl<S: TreeStorage + ?Sized> NodeReader for CommittedNodes<'_, S> {
    fn tree(&self) -> &TreeId {
        &self.tree
    }

    fn load(&self, hash: &Hash) -> MerkleResult<Node> {
        if *hash == ZERO_HASH {
            return Ok(Node::Empty);
        }
        decode_checked(&self.tree, hash, self.storage.get_node(&self.tree, hash)?)
    }
}

/// Committed nodes overlaid with this transaction's staged ones.
///
/// New nodes go to `scratch` and are only merged into `staged` once the
/// operation succeeds.
struct StagedNodes<'a, S: ?Sized> {
    storage: &'a S,
    tree: TreeId,
    staged: &'a HashMap<Hash, Node>,
    scratch: HashMap<Hash, Node>,
}

impl<S: TreeStorage + ?Sized> NodeReader for StagedNodes<'_, S> {
    fn tree(&self) -> &TreeId {
        &self.tree
    }

    fn load(&self, hash: &Hash) -> MerkleResult<Node> {
        if *hash == ZERO_HASH {
            return Ok(Node::Empty);
        }
        if let Some(node) = self.scratch.get(hash).or_else(|| self.staged.get(hash)) {
            return Ok(*node);
        }
        decode_checked(&self.tree, hash, self.storage.get_node(&self.tree, hash)?)
    }
}

impl<S: TreeStorage + ?Sized> NodeWriter for StagedNodes<'_, S> {
    fn stage(&mut self, node: Node) -> Hash {
        let hash = node.hash();
        self.scratch.insert(hash, node);
        hash
    }
}

/// Staged mutations of one identity's trees.
pub struct IdentityTrees<S: ?Sized> {
    storage: Arc<S>,
    identifier: Did,
    max_levels: usize,
    base: TreeRoots,
    roots: TreeRoots,
    staged: HashMap<TreeKind, HashMap<Hash, Node>>,
    audit: Vec<TreeAuditRecord>,
}

impl<S: TreeStorage + ?Sized> IdentityTrees<S> {
    pub fn identifier(&self) -> &Did {
        &self.identifier
    }

    /// Roots as of the start of the transaction.
    pub fn base_roots(&self) -> TreeRoots {
        self.base
    }

    /// Roots including staged mutations.
    pub fn roots(&self) -> TreeRoots {
        self.roots
    }

    pub fn is_dirty(&self) -> bool {
        self.roots != self.base
    }

    fn tree_id(&self, kind: TreeKind) -> TreeId {
        TreeId::new(self.identifier.clone(), kind)
    }

    /// Value under `key` in `kind`, seeing staged writes.
    pub fn get(&self, kind: TreeKind, key: &Hash) -> MerkleResult<Option<Hash>> {
        let empty = HashMap::new();
        let access = StagedNodes {
            storage: &*self.storage,
            tree: self.tree_id(kind),
            staged: self.staged.get(&kind).unwrap_or(&empty),
            scratch: HashMap::new(),
        };
        SparseMerkleTree::new(access, self.roots.get(kind), self.max_levels).get(key)
    }

    fn insert(
        &mut self,
        kind: TreeKind,
        key: Hash,
        value: Hash,
        operation: TreeOperation,
    ) -> MerkleResult<Hash> {
        let tree = self.tree_id(kind);
        let old_root = self.roots.get(kind);
        let staged = self.staged.entry(kind).or_default();
        let access = StagedNodes {
            storage: &*self.storage,
            tree: tree.clone(),
            staged: &*staged,
            scratch: HashMap::new(),
        };
        let mut smt = SparseMerkleTree::new(access, old_root, self.max_levels);
        let new_root = smt.add(key, value)?;
        let scratch = smt.into_access().scratch;
        self.staged.entry(kind).or_default().extend(scratch);

        self.roots.set(kind, new_root);
        self.audit.push(TreeAuditRecord {
            tree,
            old_root,
            new_root,
            operation,
            recorded_at: Utc::now(),
        });
        Ok(new_root)
    }

    /// Add a claim leaf. Returns the new Claims Tree root.
    pub fn add_claim(&mut self, index: Hash, value: Hash) -> MerkleResult<Hash> {
        self.insert(
            TreeKind::Claims,
            index,
            value,
            TreeOperation::AddClaim { index },
        )
    }

    /// Add a revocation nonce. Returns the new Revocation Tree root.
    pub fn revoke(&mut self, nonce: u64) -> MerkleResult<Hash> {
        self.insert(
            TreeKind::Revocation,
            nonce_key(nonce),
            ZERO_HASH,
            TreeOperation::Revoke { nonce },
        )
    }

    pub fn is_revoked(&self, nonce: u64) -> MerkleResult<bool> {
        Ok(self.get(TreeKind::Revocation, &nonce_key(nonce))?.is_some())
    }

    /// Record `claims_root` and `revocation_root` in the Roots Tree.
    ///
    /// Empty roots and roots already present are skipped. Returns the
    /// Roots Tree root.
    pub fn snapshot_roots(&mut self, claims_root: Hash, revocation_root: Hash) -> MerkleResult<Hash> {
        for (source, root) in [
            (TreeKind::Claims, claims_root),
            (TreeKind::Revocation, revocation_root),
        ] {
            if root == ZERO_HASH || self.get(TreeKind::Roots, &root)?.is_some() {
                continue;
            }
            self.insert(
                TreeKind::Roots,
                root,
                source.root_tag(),
                TreeOperation::SnapshotRoot { root, source },
            )?;
        }
        Ok(self.roots.roots)
    }

    /// Everything staged, ready for an atomic commit.
    pub fn into_batch(self) -> TreeBatch {
        let mut batch = TreeBatch::default();
        for kind in TreeKind::ALL {
            if self.roots.get(kind) == self.base.get(kind) {
                continue;
            }
            let tree = self.tree_id(kind);
            if let Some(nodes) = self.staged.get(&kind) {
                batch.nodes.extend(
                    nodes
                        .iter()
                        .map(|(hash, node)| (tree.clone(), *hash, node.encode())),
                );
            }
            batch.roots.push(RootUpdate {
                tree,
                expected: self.base.get(kind),
                new_root: self.roots.get(kind),
            });
        }
        batch.audit = self.audit;
        batch
    }
}

/// Merkle State Store over a tree storage backend.
pub struct MerkleStateStore<S: ?Sized> {
    storage: Arc<S>,
    config: TreeConfig,
}

impl<S: TreeStorage + ?Sized> MerkleStateStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_config(storage, TreeConfig::default())
    }

    pub fn with_config(storage: Arc<S>, config: TreeConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Start a transaction on `identifier`'s trees.
    pub fn begin(&self, identifier: &Did) -> MerkleResult<IdentityTrees<S>> {
        let roots = self.current_roots(identifier)?;
        Ok(IdentityTrees {
            storage: self.storage.clone(),
            identifier: identifier.clone(),
            max_levels: self.config.max_levels,
            base: roots,
            roots,
            staged: HashMap::new(),
            audit: Vec::new(),
        })
    }

    /// Commit a transaction on its own.
    pub fn commit(&self, trees: IdentityTrees<S>) -> MerkleResult<TreeRoots> {
        let roots = trees.roots();
        let identifier = trees.identifier().clone();
        let batch = trees.into_batch();
        if !batch.is_empty() {
            self.storage.commit(batch)?;
            debug!(did = %identifier, "[id-02] Tree mutation committed");
        }
        Ok(roots)
    }

    pub fn current_roots(&self, identifier: &Did) -> MerkleResult<TreeRoots> {
        let mut roots = TreeRoots::default();
        for kind in TreeKind::ALL {
            let tree = TreeId::new(identifier.clone(), kind);
            roots.set(kind, self.storage.get_root(&tree)?.unwrap_or(ZERO_HASH));
        }
        Ok(roots)
    }

    pub fn add_claim(&self, identifier: &Did, index: Hash, value: Hash) -> MerkleResult<Hash> {
        let mut trees = self.begin(identifier)?;
        trees.add_claim(index, value)?;
        Ok(self.commit(trees)?.claims)
    }

    pub fn revoke_claim(&self, identifier: &Did, nonce: u64) -> MerkleResult<Hash> {
        let mut trees = self.begin(identifier)?;
        trees.revoke(nonce)?;
        Ok(self.commit(trees)?.revocation)
    }

    pub fn snapshot_roots_tree(
        &self,
        identifier: &Did,
        claims_root: Hash,
        revocation_root: Hash,
    ) -> MerkleResult<Hash> {
        let mut trees = self.begin(identifier)?;
        trees.snapshot_roots(claims_root, revocation_root)?;
        Ok(self.commit(trees)?.roots)
    }

    fn committed(&self, identifier: &Did, kind: TreeKind, root: Hash) -> SparseMerkleTree<CommittedNodes<'_, S>> {
        let access = CommittedNodes {
            storage: &*self.storage,
            tree: TreeId::new(identifier.clone(), kind),
        };
        SparseMerkleTree::new(access, root, self.config.max_levels)
    }

    fn root_or_current(&self, identifier: &Did, kind: TreeKind, at: Option<Hash>) -> MerkleResult<Hash> {
        match at {
            Some(root) => Ok(root),
            None => Ok(self.current_roots(identifier)?.get(kind)),
        }
    }

    /// Proof for `key` in `kind` against `at` (a historical root) or the
    /// current root. Returns the proof and the root it proves against.
    pub fn generate_proof(
        &self,
        identifier: &Did,
        kind: TreeKind,
        key: &Hash,
        at: Option<Hash>,
    ) -> MerkleResult<(MerkleProof, Hash)> {
        let root = self.root_or_current(identifier, kind, at)?;
        let proof = self.committed(identifier, kind, root).generate_proof(key)?;
        Ok((proof, root))
    }

    pub fn get_leaf(
        &self,
        identifier: &Did,
        kind: TreeKind,
        key: &Hash,
        at: Option<Hash>,
    ) -> MerkleResult<Option<Hash>> {
        let root = self.root_or_current(identifier, kind, at)?;
        self.committed(identifier, kind, root).get(key)
    }

    /// Whether `nonce` is in the Revocation Tree at `at` (or now).
    pub fn is_revoked(&self, identifier: &Did, nonce: u64, at: Option<Hash>) -> MerkleResult<bool> {
        Ok(self
            .get_leaf(identifier, TreeKind::Revocation, &nonce_key(nonce), at)?
            .is_some())
    }

    /// Recompute every node of the three current trees.
    pub fn verify_trees(&self, identifier: &Did) -> MerkleResult<TreeRoots> {
        let roots = self.current_roots(identifier)?;
        for kind in TreeKind::ALL {
            self.committed(identifier, kind, roots.get(kind))
                .verify_integrity()?;
        }
        Ok(roots)
    }

    pub fn audit_log(&self, identifier: &Did) -> MerkleResult<Vec<TreeAuditRecord>> {
        self.storage.audit_log(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTreeDb;
    use crate::ports::TreeStorage;
    use proptest::prelude::*;
    use shared_crypto::keccak256;

    fn did() -> Did {
        Did::new("iden3", "polygon", "amoy", "issuer").unwrap()
    }

    fn store() -> MerkleStateStore<InMemoryTreeDb> {
        MerkleStateStore::new(Arc::new(InMemoryTreeDb::new()))
    }

    #[test]
    fn test_fresh_identity_has_zero_roots() {
        let store = store();
        assert_eq!(store.current_roots(&did()).unwrap(), TreeRoots::default());
    }

    #[test]
    fn test_revocation_does_not_touch_claims_root() {
        let store = store();
        let claims_root = store
            .add_claim(&did(), keccak256(b"index"), keccak256(b"value"))
            .unwrap();
        let revocation_root = store.revoke_claim(&did(), 77).unwrap();

        let roots = store.current_roots(&did()).unwrap();
        assert_eq!(roots.claims, claims_root);
        assert_eq!(roots.revocation, revocation_root);
        assert_ne!(revocation_root, ZERO_HASH);
        assert!(store.is_revoked(&did(), 77, None).unwrap());
        assert!(!store.is_revoked(&did(), 78, None).unwrap());
    }

    #[test]
    fn test_snapshot_skips_zero_and_known_roots() {
        let store = store();
        let claims_root = store
            .add_claim(&did(), keccak256(b"a"), keccak256(b"b"))
            .unwrap();

        let roots_root = store
            .snapshot_roots_tree(&did(), claims_root, ZERO_HASH)
            .unwrap();
        assert_ne!(roots_root, ZERO_HASH);

        let again = store
            .snapshot_roots_tree(&did(), claims_root, ZERO_HASH)
            .unwrap();
        assert_eq!(again, roots_root);
        assert_eq!(
            store
                .get_leaf(&did(), TreeKind::Roots, &claims_root, None)
                .unwrap(),
            Some(TreeKind::Claims.root_tag())
        );
    }

    #[test]
    fn test_mutation_and_audit_commit_together() {
        let store = store();
        store
            .add_claim(&did(), keccak256(b"i"), keccak256(b"v"))
            .unwrap();
        let log = store.audit_log(&did()).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].old_root, ZERO_HASH);
        assert_eq!(
            log[0].new_root,
            store.current_roots(&did()).unwrap().claims
        );
    }

    #[test]
    fn test_failed_operation_writes_nothing() {
        let store = store();
        store.revoke_claim(&did(), 5).unwrap();
        let before = store.current_roots(&did()).unwrap();
        let nodes = store.storage().node_count();

        assert!(matches!(
            store.revoke_claim(&did(), 5),
            Err(MerkleError::EntryExists { .. })
        ));
        assert_eq!(store.current_roots(&did()).unwrap(), before);
        assert_eq!(store.storage().node_count(), nodes);
        assert_eq!(store.audit_log(&did()).unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_transaction_rejected() {
        let store = store();
        let mut first = store.begin(&did()).unwrap();
        let mut second = store.begin(&did()).unwrap();
        first.add_claim(keccak256(b"1"), keccak256(b"x")).unwrap();
        second.add_claim(keccak256(b"2"), keccak256(b"y")).unwrap();

        store.commit(first).unwrap();
        assert!(matches!(
            store.commit(second),
            Err(MerkleError::ConcurrentUpdate { .. })
        ));
    }

    #[test]
    fn test_historical_proofs_stay_valid() {
        let store = store();
        let index = keccak256(b"claim-1");
        let old_root = store.add_claim(&did(), index, keccak256(b"v1")).unwrap();
        store
            .add_claim(&did(), keccak256(b"claim-2"), keccak256(b"v2"))
            .unwrap();

        let (proof, root) = store
            .generate_proof(&did(), TreeKind::Claims, &index, Some(old_root))
            .unwrap();
        assert_eq!(root, old_root);
        assert!(proof.existence);
        assert!(proof.verify(&old_root, &index));

        let (absent, root) = store
            .generate_proof(&did(), TreeKind::Claims, &keccak256(b"claim-3"), None)
            .unwrap();
        assert!(!absent.existence);
        assert!(absent.verify(&root, &keccak256(b"claim-3")));
    }

    #[test]
    fn test_tampered_node_is_tree_corruption() {
        let store = store();
        let root = store
            .add_claim(&did(), keccak256(b"i"), keccak256(b"v"))
            .unwrap();
        let tree = TreeId::new(did(), TreeKind::Claims);
        let forged = Node::Leaf {
            key: keccak256(b"i"),
            value: keccak256(b"forged"),
        };
        store.storage().tamper(&tree, &root, forged.encode()).unwrap();

        assert!(store.verify_trees(&did()).unwrap_err().is_corruption());
        let mut trees = store.begin(&did()).unwrap();
        assert!(trees
            .add_claim(keccak256(b"j"), keccak256(b"w"))
            .unwrap_err()
            .is_corruption());
    }

    #[test]
    fn test_identities_are_isolated() {
        let store = store();
        let other = Did::new("iden3", "polygon", "amoy", "other").unwrap();
        store
            .add_claim(&did(), keccak256(b"i"), keccak256(b"v"))
            .unwrap();
        assert_eq!(store.current_roots(&other).unwrap(), TreeRoots::default());
        assert!(store.storage().get_root(&TreeId::new(other, TreeKind::Claims)).unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_root_independent_of_insert_order(
            keys in proptest::collection::hash_set(any::<u64>(), 1..24),
            seed in any::<u64>(),
        ) {
            let keys: Vec<u64> = keys.into_iter().collect();
            let mut shuffled = keys.clone();
            // Deterministic permutation from the seed.
            let len = shuffled.len();
            for i in 0..len {
                let j = (seed.wrapping_mul(i as u64 + 1) % len as u64) as usize;
                shuffled.swap(i, j);
            }

            let a = store();
            let b = store();
            let mut ta = a.begin(&did()).unwrap();
            let mut tb = b.begin(&did()).unwrap();
            for n in &keys {
                ta.revoke(*n).unwrap();
            }
            for n in &shuffled {
                tb.revoke(*n).unwrap();
            }
            prop_assert_eq!(ta.roots().revocation, tb.roots().revocation);
        }
    }
}
