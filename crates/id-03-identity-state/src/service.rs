//! # Identity State Engine
//!
//! Identity provisioning, the pending-changes ledger, and the state
//! transition algorithm:
//!
//! 1. Collect pending claim additions and revocations.
//! 2. None: no-op, or reopen the latest state if it failed.
//! 3. Additions into the Claims Tree, then revocations into the
//!    Revocation Tree. A revocation of a claim added in the same batch
//!    waits for the next transition.
//! 4. Snapshot both roots into the Roots Tree.
//! 5. Commit trees and a new `pending` state chained to the last
//!    confirmed one, conditional on nothing being in flight.

use crate::domain::{
    auth_claim, claim_index, new_claim, roots_of, transition_message, EngineResult,
    IdentityGenesis, SignedTransition, StateEngineError, StateTransition, TransitionOutcome,
    AUTH_CLAIM_NONCE,
};
use crate::ports::StateStorage;
use chrono::{DateTime, Utc};
use id_01_kms::KeyManagement;
use id_02_merkle_store::{
    InMemoryTreeDb, MerkleError, MerkleStateStore, TreeConfig, TreeId, TreeKind,
};
use shared_types::{
    short_hex, Claim, ClaimStatus, Did, Hash, Identity, IdentityState, KeyId, KeyType, Revocation,
    StateStatus, StorageError, ZERO_HASH,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lease taken on a freshly created or reopened state.
    pub lease_duration: Duration,
    /// Also create an Ethereum key owned by each new identity.
    pub provision_eth_key: bool,
    pub tree: TreeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(600),
            provision_eth_key: true,
            tree: TreeConfig::default(),
        }
    }
}

/// Length of the state prefix used as the DID's method-specific id.
const DID_ID_BYTES: usize = 27;

pub struct IdentityStateEngine<S: ?Sized> {
    storage: Arc<S>,
    kms: Arc<dyn KeyManagement>,
    trees: MerkleStateStore<S>,
    config: EngineConfig,
}

impl<S: StateStorage + ?Sized> IdentityStateEngine<S> {
    pub fn new(storage: Arc<S>, kms: Arc<dyn KeyManagement>, config: EngineConfig) -> Self {
        let trees = MerkleStateStore::with_config(storage.clone(), config.tree);
        Self {
            storage,
            kms,
            trees,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn trees(&self) -> &MerkleStateStore<S> {
        &self.trees
    }

    pub fn kms(&self) -> &Arc<dyn KeyManagement> {
        &self.kms
    }

    pub fn lease_deadline(&self) -> DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.config.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));
        Utc::now() + lease
    }

    // =========================================================================
    // IDENTITIES
    // =========================================================================

    /// Provision an identity: auth key, auth claim, genesis state.
    ///
    /// The DID's id is derived from the genesis state, so the genesis trees
    /// are first computed in a scratch store.
    pub async fn create_identity(
        &self,
        method: &str,
        blockchain: &str,
        network: &str,
    ) -> EngineResult<(Identity, IdentityState)> {
        let auth_key = self.kms.create_key(KeyType::BabyJubJub, None).await?;
        let public_key = self.kms.public_key(&auth_key).await?;

        let placeholder = Did::new(method, blockchain, network, "genesis")
            .map_err(|e| StateEngineError::InvalidIdentity(e.to_string()))?;
        let scratch = MerkleStateStore::with_config(Arc::new(InMemoryTreeDb::new()), self.config.tree);
        let probe = auth_claim(&placeholder, &public_key);
        let mut genesis_trees = scratch.begin(&placeholder)?;
        genesis_trees.add_claim(probe.index_hash, probe.value_hash)?;
        let claims_root = genesis_trees.roots().claims;
        genesis_trees.snapshot_roots(claims_root, ZERO_HASH)?;
        let genesis = genesis_trees.roots();
        let genesis_state = genesis.state_hash();

        let did = Did::new(
            method,
            blockchain,
            network,
            &hex::encode(&genesis_state[..DID_ID_BYTES]),
        )
        .map_err(|e| StateEngineError::InvalidIdentity(e.to_string()))?;
        if self.storage.get_identity(&did)?.is_some() {
            return Err(StateEngineError::InvalidIdentity(format!("{did} already exists")));
        }

        let auth_key = self.kms.link_to_identity(&auth_key, &did).await?;
        if self.config.provision_eth_key {
            self.kms.create_key(KeyType::Ethereum, Some(&did)).await?;
        }

        let mut trees = self.trees.begin(&did)?;
        let mut claim = auth_claim(&did, &public_key);
        trees.add_claim(claim.index_hash, claim.value_hash)?;
        trees.snapshot_roots(trees.roots().claims, ZERO_HASH)?;
        if trees.roots() != genesis {
            return Err(StateEngineError::InvalidIdentity(
                "genesis roots differ from scratch computation".into(),
            ));
        }
        claim.status = ClaimStatus::Included;
        claim.included_in = Some(genesis_state);

        let now = Utc::now();
        let identity = Identity {
            identifier: did.clone(),
            auth_key,
            active: true,
            created_at: now,
        };
        let state = IdentityState {
            state_id: Uuid::new_v4(),
            identifier: did.clone(),
            previous_state: None,
            state: genesis_state,
            claims_tree_root: genesis.claims,
            revocation_tree_root: genesis.revocation,
            roots_tree_root: genesis.roots,
            status: StateStatus::Confirmed,
            tx_hash: None,
            tx_nonce: None,
            gas_price: None,
            block_number: None,
            failure_reason: None,
            attempt: 0,
            lease_until: None,
            created_at: now,
            modified_at: now,
        };

        self.storage.insert_identity(IdentityGenesis {
            identity: identity.clone(),
            state: state.clone(),
            auth_claim: claim,
            trees: trees.into_batch(),
        })?;

        info!(did = %did, state = %short_hex(&genesis_state), "[id-03] Identity created");
        Ok((identity, state))
    }

    pub fn get_identity(&self, identifier: &Did) -> EngineResult<Identity> {
        self.storage
            .get_identity(identifier)?
            .ok_or_else(|| StateEngineError::UnknownIdentity(identifier.clone()))
    }

    fn active_identity(&self, identifier: &Did) -> EngineResult<Identity> {
        let identity = self.get_identity(identifier)?;
        if !identity.active {
            return Err(StateEngineError::IdentityInactive(identifier.clone()));
        }
        Ok(identity)
    }

    /// Deactivate an identity. Its history is kept.
    pub fn deactivate_identity(&self, identifier: &Did) -> EngineResult<()> {
        self.get_identity(identifier)?;
        self.storage.set_identity_active(identifier, false)?;
        info!(did = %identifier, "[id-03] Identity deactivated");
        Ok(())
    }

    /// First Ethereum key owned by the identity, if any.
    pub async fn identity_eth_key(&self, identifier: &Did) -> EngineResult<Option<KeyId>> {
        let keys = self.kms.keys_by_identity(identifier).await?;
        Ok(keys.into_iter().find(|k| k.key_type == KeyType::Ethereum))
    }

    // =========================================================================
    // PENDING-CHANGES LEDGER
    // =========================================================================

    /// Record a pending claim. Returns immediately; it enters the Claims
    /// Tree with the next transition.
    pub fn add_claim(&self, identifier: &Did, schema_hash: Hash, data: &[u8]) -> EngineResult<Claim> {
        self.active_identity(identifier)?;

        let index = claim_index(&schema_hash, data);
        let known = self.storage.find_claim_by_index(identifier, &index)?.is_some()
            || self
                .trees
                .get_leaf(identifier, TreeKind::Claims, &index, None)?
                .is_some();
        if known {
            return Err(StateEngineError::DuplicateClaim(hex::encode(index)));
        }

        // Random nonces, skipping the auth claim's and any already in use.
        let mut rev_nonce = rand::random::<u64>();
        while rev_nonce == AUTH_CLAIM_NONCE
            || self.storage.find_claim_by_nonce(identifier, rev_nonce)?.is_some()
        {
            rev_nonce = rand::random::<u64>();
        }

        let claim = new_claim(identifier, schema_hash, data, rev_nonce);
        self.storage.insert_claim(claim.clone()).map_err(|e| match e {
            StorageError::Conflict(_) => StateEngineError::DuplicateClaim(hex::encode(index)),
            other => other.into(),
        })?;
        debug!(did = %identifier, nonce = rev_nonce, "[id-03] Claim recorded");
        Ok(claim)
    }

    /// Record a pending revocation. Repeating a revocation returns the
    /// existing record.
    pub fn revoke_claim(&self, identifier: &Did, nonce: u64) -> EngineResult<Revocation> {
        self.active_identity(identifier)?;
        if nonce == AUTH_CLAIM_NONCE {
            return Err(StateEngineError::InvalidRevocation(
                "the auth claim cannot be revoked".into(),
            ));
        }
        if let Some(existing) = self.storage.find_revocation(identifier, nonce)? {
            return Ok(existing);
        }

        let revocation = Revocation {
            identifier: identifier.clone(),
            nonce,
            status: ClaimStatus::Pending,
            included_in: None,
            created_at: Utc::now(),
        };
        self.storage.insert_revocation(revocation.clone())?;
        debug!(did = %identifier, nonce, "[id-03] Revocation recorded");
        Ok(revocation)
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Compute and persist the identity's next transition.
    pub fn compute_transition(&self, identifier: &Did) -> EngineResult<TransitionOutcome> {
        self.active_identity(identifier)?;

        let claims = self.storage.pending_claims(identifier)?;
        let revocations = self.storage.pending_revocations(identifier)?;
        let latest = self.storage.latest_state(identifier)?;

        if claims.is_empty() && revocations.is_empty() {
            return self.reopen_or_noop(identifier, latest);
        }

        // New claims wait for the in-flight transition to resolve.
        if let Some(in_flight) = self.storage.in_flight_state(identifier)? {
            debug!(
                did = %identifier,
                status = %in_flight.status,
                "[id-03] Pending changes wait for in-flight state"
            );
            return Err(StateEngineError::PublicationInProgress(identifier.clone()));
        }

        let previous = self.storage.current_state(identifier)?.ok_or_else(|| {
            StateEngineError::BrokenChain(format!("{identifier} has no confirmed state"))
        })?;

        let mut trees = self.trees.begin(identifier)?;
        if let Some(latest) = &latest {
            if roots_of(latest) != trees.base_roots() {
                error!(
                    did = %identifier,
                    state = %short_hex(&latest.state),
                    "[id-03] Committed tree roots diverge from latest state"
                );
                return Err(MerkleError::TreeCorruption {
                    tree: TreeId::new(identifier.clone(), TreeKind::Roots),
                    reason: format!(
                        "tree roots do not hash to latest state {}",
                        short_hex(&latest.state)
                    ),
                }
                .into());
            }
        }

        let mut included_claims = Vec::with_capacity(claims.len());
        let mut added_nonces = HashSet::with_capacity(claims.len());
        for claim in &claims {
            trees.add_claim(claim.index_hash, claim.value_hash)?;
            included_claims.push(claim.id);
            added_nonces.insert(claim.rev_nonce);
        }

        let mut included_revocations = Vec::new();
        let mut already_revoked = Vec::new();
        for revocation in &revocations {
            if added_nonces.contains(&revocation.nonce) {
                debug!(
                    did = %identifier,
                    nonce = revocation.nonce,
                    "[id-03] Revocation deferred: claim enters tree in this transition"
                );
                continue;
            }
            if trees.is_revoked(revocation.nonce)? {
                already_revoked.push(revocation.nonce);
                continue;
            }
            trees.revoke(revocation.nonce)?;
            included_revocations.push(revocation.nonce);
        }

        if !trees.is_dirty() {
            if let (false, Some(latest)) = (already_revoked.is_empty(), &latest) {
                self.storage
                    .mark_revocations_included(identifier, &already_revoked, latest.state)?;
            }
            return Ok(TransitionOutcome::NoPendingChanges(latest));
        }
        included_revocations.extend(already_revoked);

        let changed = trees.roots();
        trees.snapshot_roots(changed.claims, changed.revocation)?;
        let roots = trees.roots();

        let now = Utc::now();
        let state = IdentityState {
            state_id: Uuid::new_v4(),
            identifier: identifier.clone(),
            previous_state: Some(previous.state),
            state: roots.state_hash(),
            claims_tree_root: roots.claims,
            revocation_tree_root: roots.revocation,
            roots_tree_root: roots.roots,
            status: StateStatus::Pending,
            tx_hash: None,
            tx_nonce: None,
            gas_price: None,
            block_number: None,
            failure_reason: None,
            attempt: 0,
            lease_until: Some(self.lease_deadline()),
            created_at: now,
            modified_at: now,
        };

        self.storage
            .commit_transition(StateTransition {
                trees: trees.into_batch(),
                state: state.clone(),
                included_claims,
                included_revocations,
            })
            .map_err(|e| match e {
                StorageError::Conflict(reason) => {
                    warn!(did = %identifier, %reason, "[id-03] Transition commit lost race");
                    StateEngineError::PublicationInProgress(identifier.clone())
                }
                other => other.into(),
            })?;

        info!(
            did = %identifier,
            old = %short_hex(&previous.state),
            new = %short_hex(&state.state),
            claims = claims.len(),
            revocations = revocations.len(),
            "[id-03] State transition created"
        );
        Ok(TransitionOutcome::Created(state))
    }

    fn reopen_or_noop(
        &self,
        identifier: &Did,
        latest: Option<IdentityState>,
    ) -> EngineResult<TransitionOutcome> {
        let Some(failed) = latest.as_ref().filter(|s| s.status == StateStatus::Failed) else {
            return Ok(TransitionOutcome::NoPendingChanges(latest));
        };
        match self
            .storage
            .reopen_failed(&failed.state_id, self.lease_deadline())
        {
            Ok(reopened) => {
                info!(
                    did = %identifier,
                    state = %short_hex(&reopened.state),
                    "[id-03] Failed state reopened for resubmission"
                );
                Ok(TransitionOutcome::Reopened(reopened))
            }
            Err(StorageError::Conflict(_)) => {
                Err(StateEngineError::PublicationInProgress(identifier.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sign `state`'s transition from the last confirmed state with the
    /// identity's auth key.
    pub async fn sign_transition(&self, state: &IdentityState) -> EngineResult<SignedTransition> {
        let identity = self.get_identity(&state.identifier)?;
        let previous = self
            .storage
            .current_state(&state.identifier)?
            .ok_or_else(|| {
                StateEngineError::BrokenChain(format!("{} has no confirmed state", state.identifier))
            })?;
        if state.previous_state != Some(previous.state) {
            return Err(StateEngineError::BrokenChain(format!(
                "state {} does not build on confirmed state {}",
                short_hex(&state.state),
                short_hex(&previous.state)
            )));
        }

        let auth_public_key = self.kms.public_key(&identity.auth_key).await?;
        let message = transition_message(&previous.state, &state.state);
        let signature = self.kms.sign(&identity.auth_key, &message).await?;

        Ok(SignedTransition {
            identifier: state.identifier.clone(),
            old_state: previous.state,
            old_roots: roots_of(&previous),
            new_state: state.state,
            new_roots: roots_of(state),
            is_old_state_genesis: previous.is_genesis(),
            auth_public_key,
            signature,
        })
    }
}
