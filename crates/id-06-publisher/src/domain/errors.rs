//! Publisher errors.

use id_03_identity_state::StateEngineError;
use id_04_proof_generator::ProofError;
use id_05_eth_gateway::GatewayError;
use shared_types::{Did, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    /// Another publication for this identity is pending or transacted.
    /// Rejected, not queued.
    #[error("Publication already in progress for {0}")]
    PublicationInProgress(Did),

    #[error("Unknown identity: {0}")]
    UnknownIdentity(Did),

    #[error("No Ethereum key to publish {0}")]
    NoSigningKey(Did),

    #[error(transparent)]
    Engine(StateEngineError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<StateEngineError> for PublishError {
    fn from(err: StateEngineError) -> Self {
        match err {
            StateEngineError::PublicationInProgress(did) => PublishError::PublicationInProgress(did),
            StateEngineError::UnknownIdentity(did) => PublishError::UnknownIdentity(did),
            other => PublishError::Engine(other),
        }
    }
}

impl PublishError {
    /// Caller errors: rejected synchronously, nothing was mutated.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PublishError::PublicationInProgress(_) | PublishError::UnknownIdentity(_)
        )
    }
}

pub type PublishResult<T> = Result<T, PublishError>;
