//! # Inbound Ports
//!
//! The signing capability consumed by the other subsystems.

use crate::domain::KmsResult;
use async_trait::async_trait;
use shared_types::{Did, KeyId, KeyType};

/// Key management API - inbound port.
///
/// Callers only ever hold [`KeyId`] references.
#[async_trait]
pub trait KeyManagement: Send + Sync {
    /// Create a key of `key_type`, scoped to `owner` when given.
    async fn create_key(&self, key_type: KeyType, owner: Option<&Did>) -> KmsResult<KeyId>;

    /// Re-scope an unowned key under `owner`. Returns the new id.
    async fn link_to_identity(&self, key: &KeyId, owner: &Did) -> KmsResult<KeyId>;

    /// Public key bytes of `key`.
    async fn public_key(&self, key: &KeyId) -> KmsResult<Vec<u8>>;

    /// Sign `payload` with `key`.
    async fn sign(&self, key: &KeyId, payload: &[u8]) -> KmsResult<Vec<u8>>;

    /// All keys owned by `owner`, across providers.
    async fn keys_by_identity(&self, owner: &Did) -> KmsResult<Vec<KeyId>>;
}
