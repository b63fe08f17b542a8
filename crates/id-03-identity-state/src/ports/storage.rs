//! # Persistence Port
//!
//! Transactional record storage for identities, claims, revocations and
//! states. Tree nodes share the same backend through [`TreeStorage`] so a
//! transition's tree mutations and its state record commit together.
//!
//! Single-flight per identity is enforced here, by conditional writes, not
//! by any in-process lock: it must hold across replicas sharing the store.

use crate::domain::{IdentityGenesis, StateTransition};
use chrono::{DateTime, Utc};
use id_02_merkle_store::TreeStorage;
use shared_types::{Claim, Did, Hash, Identity, IdentityState, Revocation, StateStatus, StorageError};
use uuid::Uuid;

pub trait StateStorage: TreeStorage {
    // =========================================================================
    // IDENTITIES
    // =========================================================================

    fn get_identity(&self, identifier: &Did) -> Result<Option<Identity>, StorageError>;

    fn list_identities(&self) -> Result<Vec<Identity>, StorageError>;

    /// Insert identity, genesis state, auth claim and genesis trees.
    /// `Conflict` if the identity exists.
    fn insert_identity(&self, genesis: IdentityGenesis) -> Result<(), StorageError>;

    fn set_identity_active(&self, identifier: &Did, active: bool) -> Result<(), StorageError>;

    // =========================================================================
    // PENDING-CHANGES LEDGER
    // =========================================================================

    fn insert_claim(&self, claim: Claim) -> Result<(), StorageError>;

    /// Claims not yet in any tree root, oldest first.
    fn pending_claims(&self, identifier: &Did) -> Result<Vec<Claim>, StorageError>;

    fn find_claim_by_index(&self, identifier: &Did, index: &Hash) -> Result<Option<Claim>, StorageError>;

    fn find_claim_by_nonce(&self, identifier: &Did, nonce: u64) -> Result<Option<Claim>, StorageError>;

    fn insert_revocation(&self, revocation: Revocation) -> Result<(), StorageError>;

    /// Revocations not yet in any tree root, oldest first.
    fn pending_revocations(&self, identifier: &Did) -> Result<Vec<Revocation>, StorageError>;

    fn find_revocation(&self, identifier: &Did, nonce: u64) -> Result<Option<Revocation>, StorageError>;

    /// Settle pending revocations whose nonce is already in the tree.
    fn mark_revocations_included(
        &self,
        identifier: &Did,
        nonces: &[u64],
        state: Hash,
    ) -> Result<(), StorageError>;

    /// Identities with pending claims/revocations or an unconfirmed latest
    /// state (pending, transacted or failed).
    fn identities_with_pending_changes(&self) -> Result<Vec<Did>, StorageError>;

    // =========================================================================
    // STATES
    // =========================================================================

    fn get_state(&self, state_id: &Uuid) -> Result<Option<IdentityState>, StorageError>;

    /// Last confirmed state (genesis included).
    fn current_state(&self, identifier: &Did) -> Result<Option<IdentityState>, StorageError>;

    /// Most recently created state, any status.
    fn latest_state(&self, identifier: &Did) -> Result<Option<IdentityState>, StorageError>;

    /// The pending or transacted state, if one exists.
    fn in_flight_state(&self, identifier: &Did) -> Result<Option<IdentityState>, StorageError>;

    /// History, oldest first.
    fn states(&self, identifier: &Did) -> Result<Vec<IdentityState>, StorageError>;

    fn states_with_status(&self, status: StateStatus) -> Result<Vec<IdentityState>, StorageError>;

    /// Commit trees + new pending state + ledger updates.
    ///
    /// `Conflict` without writing anything if the identity already has an
    /// in-flight state or a tree root moved.
    fn commit_transition(&self, transition: StateTransition) -> Result<(), StorageError>;

    /// Move a failed state back to pending under a fresh lease.
    ///
    /// `Conflict` unless the state is failed, is the identity's latest and
    /// no other state is in flight.
    fn reopen_failed(
        &self,
        state_id: &Uuid,
        lease_until: DateTime<Utc>,
    ) -> Result<IdentityState, StorageError>;

    /// Overwrite a state record by id.
    ///
    /// `Conflict` if confirming it would give two confirmed states the same
    /// `previous_state`.
    fn update_state(&self, state: &IdentityState) -> Result<(), StorageError>;

    /// Take the lease of an in-flight state if it is free or expired.
    /// Returns the leased state, or `None` if another worker holds it.
    fn acquire_lease(
        &self,
        state_id: &Uuid,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<IdentityState>, StorageError>;

    fn release_lease(&self, state_id: &Uuid) -> Result<(), StorageError>;
}
