//! # Engine Errors

use id_01_kms::KmsError;
use id_02_merkle_store::MerkleError;
use shared_types::{Did, StorageError};
use thiserror::Error;

/// Errors from identity provisioning, the claim ledger and transitions.
///
/// `NoPendingChanges` is not here: it is a successful outcome.
#[derive(Debug, Error)]
pub enum StateEngineError {
    #[error("Unknown identity: {0}")]
    UnknownIdentity(Did),

    #[error("Identity {0} is deactivated")]
    IdentityInactive(Did),

    /// An unconfirmed state exists; new transitions wait for it.
    #[error("Publication already in progress for {0}")]
    PublicationInProgress(Did),

    #[error("Claim already issued with index {0}")]
    DuplicateClaim(String),

    #[error("Invalid revocation: {0}")]
    InvalidRevocation(String),

    #[error("Tree error: {0}")]
    Tree(#[from] MerkleError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Key management error: {0}")]
    Kms(#[from] KmsError),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// A state does not build on the identity's last confirmed state.
    #[error("State chain broken: {0}")]
    BrokenChain(String),
}

impl StateEngineError {
    /// Tree corruption is fatal for the identity until manual recovery.
    pub fn is_tree_corruption(&self) -> bool {
        matches!(self, StateEngineError::Tree(e) if e.is_corruption())
    }
}

pub type EngineResult<T> = Result<T, StateEngineError>;
