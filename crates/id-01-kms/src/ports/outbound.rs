//! # Outbound Ports
//!
//! Backends that actually hold key material.

use crate::domain::KmsResult;
use async_trait::async_trait;
use shared_types::{Did, KeyId, KeyType};

/// Signing backend for one key type - outbound port.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Key type served by this provider.
    fn key_type(&self) -> KeyType;

    /// Generate and store a new key.
    async fn new_key(&self, owner: Option<&Did>) -> KmsResult<KeyId>;

    /// Move an unowned key under `owner`.
    async fn link_to_identity(&self, key: &KeyId, owner: &Did) -> KmsResult<KeyId>;

    async fn public_key(&self, key: &KeyId) -> KmsResult<Vec<u8>>;

    async fn sign(&self, key: &KeyId, payload: &[u8]) -> KmsResult<Vec<u8>>;

    /// Keys whose path belongs to `owner`.
    async fn keys_by_identity(&self, owner: &Did) -> KmsResult<Vec<KeyId>>;
}
