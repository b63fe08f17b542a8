//! In-memory state storage.
//!
//! All tables sit behind one `RwLock`, so every conditional write checks
//! and applies under the same guard.

use crate::domain::{IdentityGenesis, StateTransition};
use crate::ports::StateStorage;
use chrono::{DateTime, Utc};
use id_02_merkle_store::{
    MerkleError, MerkleResult, TreeAuditRecord, TreeBatch, TreeId, TreeStorage, TreeTables,
};
use shared_types::{
    Claim, ClaimStatus, Did, Hash, Identity, IdentityState, Revocation, StateStatus, StorageError,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    trees: TreeTables,
    identities: BTreeMap<Did, Identity>,
    claims: Vec<Claim>,
    revocations: Vec<Revocation>,
    states: Vec<IdentityState>,
}

impl Tables {
    fn states_of<'a>(&'a self, identifier: &'a Did) -> impl Iterator<Item = &'a IdentityState> + 'a {
        self.states.iter().filter(move |s| &s.identifier == identifier)
    }

    fn in_flight(&self, identifier: &Did) -> Option<&IdentityState> {
        self.states
            .iter()
            .find(|s| &s.identifier == identifier && s.status.is_in_flight())
    }

    fn latest(&self, identifier: &Did) -> Option<&IdentityState> {
        self.states.iter().rev().find(|s| &s.identifier == identifier)
    }

    fn check_trees(&self, batch: &TreeBatch) -> Result<(), StorageError> {
        self.trees.check(batch).map_err(tree_conflict)
    }
}

fn tree_conflict(err: MerkleError) -> StorageError {
    match err {
        MerkleError::Storage(e) => e,
        other => StorageError::Conflict(other.to_string()),
    }
}

fn poisoned() -> StorageError {
    StorageError::DatabaseError("state store lock poisoned".into())
}

#[derive(Default)]
pub struct InMemoryStateStore {
    tables: RwLock<Tables>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|_| poisoned())
    }

    /// Overwrite a stored tree node. Only for corruption tests.
    pub fn tamper_node(&self, tree: &TreeId, hash: &Hash, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.write()?.trees.tamper(tree, hash, bytes);
        Ok(())
    }
}

impl TreeStorage for InMemoryStateStore {
    fn get_node(&self, tree: &TreeId, hash: &Hash) -> MerkleResult<Option<Vec<u8>>> {
        Ok(self.read()?.trees.node(tree, hash))
    }

    fn get_root(&self, tree: &TreeId) -> MerkleResult<Option<Hash>> {
        Ok(self.read()?.trees.root(tree))
    }

    fn commit(&self, batch: TreeBatch) -> MerkleResult<()> {
        let mut tables = self.write()?;
        tables.trees.check(&batch)?;
        tables.trees.apply(batch);
        Ok(())
    }

    fn audit_log(&self, identifier: &Did) -> MerkleResult<Vec<TreeAuditRecord>> {
        Ok(self.read()?.trees.audit_log(identifier))
    }
}

impl StateStorage for InMemoryStateStore {
    fn get_identity(&self, identifier: &Did) -> Result<Option<Identity>, StorageError> {
        Ok(self.read()?.identities.get(identifier).cloned())
    }

    fn list_identities(&self) -> Result<Vec<Identity>, StorageError> {
        Ok(self.read()?.identities.values().cloned().collect())
    }

    fn insert_identity(&self, genesis: IdentityGenesis) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let did = genesis.identity.identifier.clone();
        if tables.identities.contains_key(&did) {
            return Err(StorageError::Conflict(format!("identity {did} exists")));
        }
        tables.check_trees(&genesis.trees)?;
        tables.trees.apply(genesis.trees);
        tables.identities.insert(did, genesis.identity);
        tables.claims.push(genesis.auth_claim);
        tables.states.push(genesis.state);
        Ok(())
    }

    fn set_identity_active(&self, identifier: &Did, active: bool) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let identity = tables
            .identities
            .get_mut(identifier)
            .ok_or_else(|| StorageError::NotFound(identifier.to_string()))?;
        identity.active = active;
        Ok(())
    }

    fn insert_claim(&self, claim: Claim) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let duplicate = tables
            .claims
            .iter()
            .any(|c| c.identifier == claim.identifier && c.index_hash == claim.index_hash);
        if duplicate {
            return Err(StorageError::Conflict(format!(
                "claim index {} exists",
                hex::encode(claim.index_hash)
            )));
        }
        tables.claims.push(claim);
        Ok(())
    }

    fn pending_claims(&self, identifier: &Did) -> Result<Vec<Claim>, StorageError> {
        Ok(self
            .read()?
            .claims
            .iter()
            .filter(|c| &c.identifier == identifier && c.status == ClaimStatus::Pending)
            .cloned()
            .collect())
    }

    fn find_claim_by_index(&self, identifier: &Did, index: &Hash) -> Result<Option<Claim>, StorageError> {
        Ok(self
            .read()?
            .claims
            .iter()
            .find(|c| &c.identifier == identifier && &c.index_hash == index)
            .cloned())
    }

    fn find_claim_by_nonce(&self, identifier: &Did, nonce: u64) -> Result<Option<Claim>, StorageError> {
        Ok(self
            .read()?
            .claims
            .iter()
            .find(|c| &c.identifier == identifier && c.rev_nonce == nonce)
            .cloned())
    }

    fn insert_revocation(&self, revocation: Revocation) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let duplicate = tables
            .revocations
            .iter()
            .any(|r| r.identifier == revocation.identifier && r.nonce == revocation.nonce);
        if duplicate {
            return Err(StorageError::Conflict(format!(
                "revocation of nonce {} exists",
                revocation.nonce
            )));
        }
        tables.revocations.push(revocation);
        Ok(())
    }

    fn pending_revocations(&self, identifier: &Did) -> Result<Vec<Revocation>, StorageError> {
        Ok(self
            .read()?
            .revocations
            .iter()
            .filter(|r| &r.identifier == identifier && r.status == ClaimStatus::Pending)
            .cloned()
            .collect())
    }

    fn find_revocation(&self, identifier: &Did, nonce: u64) -> Result<Option<Revocation>, StorageError> {
        Ok(self
            .read()?
            .revocations
            .iter()
            .find(|r| &r.identifier == identifier && r.nonce == nonce)
            .cloned())
    }

    fn mark_revocations_included(
        &self,
        identifier: &Did,
        nonces: &[u64],
        state: Hash,
    ) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        for r in tables
            .revocations
            .iter_mut()
            .filter(|r| &r.identifier == identifier && nonces.contains(&r.nonce))
        {
            r.status = ClaimStatus::Included;
            r.included_in = Some(state);
        }
        Ok(())
    }

    fn identities_with_pending_changes(&self) -> Result<Vec<Did>, StorageError> {
        let tables = self.read()?;
        let mut dids = BTreeSet::new();
        for c in tables.claims.iter().filter(|c| c.status == ClaimStatus::Pending) {
            dids.insert(c.identifier.clone());
        }
        for r in tables
            .revocations
            .iter()
            .filter(|r| r.status == ClaimStatus::Pending)
        {
            dids.insert(r.identifier.clone());
        }
        for did in tables.identities.keys() {
            if tables
                .latest(did)
                .is_some_and(|s| s.status != StateStatus::Confirmed)
            {
                dids.insert(did.clone());
            }
        }
        Ok(dids.into_iter().collect())
    }

    fn get_state(&self, state_id: &Uuid) -> Result<Option<IdentityState>, StorageError> {
        Ok(self
            .read()?
            .states
            .iter()
            .find(|s| &s.state_id == state_id)
            .cloned())
    }

    fn current_state(&self, identifier: &Did) -> Result<Option<IdentityState>, StorageError> {
        Ok(self
            .read()?
            .states_of(identifier)
            .filter(|s| s.status == StateStatus::Confirmed)
            .last()
            .cloned())
    }

    fn latest_state(&self, identifier: &Did) -> Result<Option<IdentityState>, StorageError> {
        Ok(self.read()?.latest(identifier).cloned())
    }

    fn in_flight_state(&self, identifier: &Did) -> Result<Option<IdentityState>, StorageError> {
        Ok(self.read()?.in_flight(identifier).cloned())
    }

    fn states(&self, identifier: &Did) -> Result<Vec<IdentityState>, StorageError> {
        Ok(self.read()?.states_of(identifier).cloned().collect())
    }

    fn states_with_status(&self, status: StateStatus) -> Result<Vec<IdentityState>, StorageError> {
        Ok(self
            .read()?
            .states
            .iter()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    fn commit_transition(&self, transition: StateTransition) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let did = transition.state.identifier.clone();
        if let Some(existing) = tables.in_flight(&did) {
            return Err(StorageError::Conflict(format!(
                "identity {did} has {} state {}",
                existing.status, existing.state_id
            )));
        }
        tables.check_trees(&transition.trees)?;

        let state_hash = transition.state.state;
        tables.trees.apply(transition.trees);
        for claim in tables
            .claims
            .iter_mut()
            .filter(|c| transition.included_claims.contains(&c.id))
        {
            claim.status = ClaimStatus::Included;
            claim.included_in = Some(state_hash);
        }
        for r in tables.revocations.iter_mut().filter(|r| {
            r.identifier == did && transition.included_revocations.contains(&r.nonce)
        }) {
            r.status = ClaimStatus::Included;
            r.included_in = Some(state_hash);
        }
        tables.states.push(transition.state);
        Ok(())
    }

    fn reopen_failed(
        &self,
        state_id: &Uuid,
        lease_until: DateTime<Utc>,
    ) -> Result<IdentityState, StorageError> {
        let mut tables = self.write()?;
        let state = tables
            .states
            .iter()
            .find(|s| &s.state_id == state_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(state_id.to_string()))?;
        if state.status != StateStatus::Failed {
            return Err(StorageError::Conflict(format!(
                "state {state_id} is {}, not failed",
                state.status
            )));
        }
        if tables.in_flight(&state.identifier).is_some() {
            return Err(StorageError::Conflict(format!(
                "identity {} has an in-flight state",
                state.identifier
            )));
        }
        if tables.latest(&state.identifier).map(|s| s.state_id) != Some(*state_id) {
            return Err(StorageError::Conflict(format!(
                "state {state_id} was superseded"
            )));
        }

        let record = tables
            .states
            .iter_mut()
            .find(|s| &s.state_id == state_id)
            .ok_or_else(|| StorageError::NotFound(state_id.to_string()))?;
        record.status = StateStatus::Pending;
        record.failure_reason = None;
        record.lease_until = Some(lease_until);
        record.modified_at = Utc::now();
        Ok(record.clone())
    }

    fn update_state(&self, state: &IdentityState) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if state.status == StateStatus::Confirmed {
            let forked = tables.states_of(&state.identifier).any(|s| {
                s.state_id != state.state_id
                    && s.status == StateStatus::Confirmed
                    && s.previous_state == state.previous_state
            });
            if forked {
                return Err(StorageError::Conflict(format!(
                    "a confirmed state of {} already builds on the same previous state",
                    state.identifier
                )));
            }
        }
        let record = tables
            .states
            .iter_mut()
            .find(|s| s.state_id == state.state_id)
            .ok_or_else(|| StorageError::NotFound(state.state_id.to_string()))?;
        *record = state.clone();
        Ok(())
    }

    fn acquire_lease(
        &self,
        state_id: &Uuid,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<IdentityState>, StorageError> {
        let mut tables = self.write()?;
        let record = tables
            .states
            .iter_mut()
            .find(|s| &s.state_id == state_id)
            .ok_or_else(|| StorageError::NotFound(state_id.to_string()))?;
        if !record.status.is_in_flight() || record.lease_active(now) {
            return Ok(None);
        }
        record.lease_until = Some(until);
        Ok(Some(record.clone()))
    }

    fn release_lease(&self, state_id: &Uuid) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if let Some(record) = tables.states.iter_mut().find(|s| &s.state_id == state_id) {
            record.lease_until = None;
        }
        Ok(())
    }
}
