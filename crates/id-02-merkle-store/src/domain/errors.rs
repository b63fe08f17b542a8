use super::TreeId;
use shared_types::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MerkleError {
    /// A stored node is missing or does not hash to its address.
    /// Fatal for the identity until manually recovered.
    #[error("Tree corruption in {tree}: {reason}")]
    TreeCorruption { tree: TreeId, reason: String },

    #[error("Malformed node: {0}")]
    MalformedNode(String),

    #[error("Entry already exists in {tree}: {key}")]
    EntryExists { tree: TreeId, key: String },

    #[error("Tree depth exceeded: max {max_levels} levels")]
    MaxLevelsReached { max_levels: usize },

    /// The committed root moved under a staged transaction.
    #[error("Root of {tree} changed concurrently")]
    ConcurrentUpdate { tree: TreeId },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MerkleError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, MerkleError::TreeCorruption { .. })
    }
}

pub type MerkleResult<T> = Result<T, MerkleError>;
