//! # KMS Registry
//!
//! Routes every request to the provider registered for the key's type.
//! Registration happens once, on [`KmsBuilder`], before the first request.

use crate::domain::{KmsError, KmsResult};
use crate::ports::{KeyManagement, KeyProvider};
use async_trait::async_trait;
use shared_types::{Did, KeyId, KeyType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Collects providers before the registry is frozen.
#[derive(Default)]
pub struct KmsBuilder {
    providers: BTreeMap<KeyType, Arc<dyn KeyProvider>>,
}

impl KmsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `key_type`.
    ///
    /// Fails with [`KmsError::DuplicateProvider`] if the type is taken.
    pub fn register(
        mut self,
        key_type: KeyType,
        provider: Arc<dyn KeyProvider>,
    ) -> KmsResult<Self> {
        if self.providers.contains_key(&key_type) {
            return Err(KmsError::DuplicateProvider(key_type));
        }
        info!("[id-01] Registered key provider for {}", key_type);
        self.providers.insert(key_type, provider);
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> Kms {
        Kms {
            providers: self.providers,
        }
    }
}

/// Immutable key-type → provider registry.
pub struct Kms {
    providers: BTreeMap<KeyType, Arc<dyn KeyProvider>>,
}

impl Kms {
    pub fn builder() -> KmsBuilder {
        KmsBuilder::new()
    }

    /// Key types with a registered provider.
    pub fn key_types(&self) -> Vec<KeyType> {
        self.providers.keys().copied().collect()
    }

    fn provider(&self, key_type: KeyType) -> KmsResult<&Arc<dyn KeyProvider>> {
        self.providers
            .get(&key_type)
            .ok_or(KmsError::NoProvider(key_type))
    }
}

#[async_trait]
impl KeyManagement for Kms {
    async fn create_key(&self, key_type: KeyType, owner: Option<&Did>) -> KmsResult<KeyId> {
        let key = self.provider(key_type)?.new_key(owner).await?;
        debug!(key = %key, "[id-01] Key created");
        Ok(key)
    }

    async fn link_to_identity(&self, key: &KeyId, owner: &Did) -> KmsResult<KeyId> {
        self.provider(key.key_type)?
            .link_to_identity(key, owner)
            .await
    }

    async fn public_key(&self, key: &KeyId) -> KmsResult<Vec<u8>> {
        self.provider(key.key_type)?.public_key(key).await
    }

    async fn sign(&self, key: &KeyId, payload: &[u8]) -> KmsResult<Vec<u8>> {
        self.provider(key.key_type)?.sign(key, payload).await
    }

    async fn keys_by_identity(&self, owner: &Did) -> KmsResult<Vec<KeyId>> {
        let mut keys = Vec::new();
        for provider in self.providers.values() {
            keys.extend(provider.keys_by_identity(owner).await?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LocalFileKeyProvider, LocalKeyFile};

    fn local_kms(dir: &tempfile::TempDir) -> Kms {
        let file = Arc::new(LocalKeyFile::new(dir.path().join("kms.json")));
        Kms::builder()
            .register(
                KeyType::Ethereum,
                Arc::new(LocalFileKeyProvider::new(KeyType::Ethereum, file.clone())),
            )
            .unwrap()
            .register(
                KeyType::BabyJubJub,
                Arc::new(LocalFileKeyProvider::new(KeyType::BabyJubJub, file)),
            )
            .unwrap()
            .build()
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(LocalKeyFile::new(dir.path().join("kms.json")));
        let provider: Arc<dyn KeyProvider> =
            Arc::new(LocalFileKeyProvider::new(KeyType::Ethereum, file));

        let result = Kms::builder()
            .register(KeyType::Ethereum, provider.clone())
            .unwrap()
            .register(KeyType::Ethereum, provider);

        assert!(matches!(
            result,
            Err(KmsError::DuplicateProvider(KeyType::Ethereum))
        ));
    }

    #[tokio::test]
    async fn test_unregistered_type() {
        let kms = Kms::builder().build();
        let result = kms.create_key(KeyType::BabyJubJub, None).await;
        assert!(matches!(result, Err(KmsError::NoProvider(KeyType::BabyJubJub))));
    }

    #[tokio::test]
    async fn test_keys_by_identity_spans_providers() {
        let dir = tempfile::tempdir().unwrap();
        let kms = local_kms(&dir);
        let did = Did::new("iden3", "polygon", "amoy", "issuer").unwrap();

        let eth = kms.create_key(KeyType::Ethereum, Some(&did)).await.unwrap();
        let bjj = kms.create_key(KeyType::BabyJubJub, Some(&did)).await.unwrap();
        kms.create_key(KeyType::Ethereum, None).await.unwrap();

        let mut keys = kms.keys_by_identity(&did).await.unwrap();
        keys.sort_by(|a, b| a.id.cmp(&b.id));
        let mut expected = vec![eth, bjj];
        expected.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(keys, expected);
    }
}
