//! # Local File Key Provider
//!
//! Keys persisted as a JSON array of `{key_path, key_type, private_key}`
//! records. One [`LocalKeyFile`] is shared by the providers of every key
//! type; all access goes through its mutex.
//!
//! Lookup by DID is a substring match on `key_path`; lookup by key id is an
//! exact match. When an encryption key is configured, `private_key` holds
//! `enc:<hex(nonce || ciphertext)>` instead of the hex secret.

use crate::domain::{key_path, KeyMaterial, KmsError, KmsResult};
use crate::ports::KeyProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_crypto::SecretKey;
use shared_types::{Did, KeyId, KeyType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

const ENCRYPTED_PREFIX: &str = "enc:";

/// One record of the key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFileEntry {
    pub key_path: String,
    pub key_type: String,
    pub private_key: String,
}

/// Serialized access to the key file.
pub struct LocalKeyFile {
    path: PathBuf,
    encryption_key: Option<SecretKey>,
    lock: Mutex<()>,
}

impl LocalKeyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encryption_key: None,
            lock: Mutex::new(()),
        }
    }

    /// Encrypt private keys at rest with XChaCha20-Poly1305.
    pub fn with_encryption(mut self, key: SecretKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an empty key list if the file does not exist yet.
    pub async fn create_if_missing(&self) -> KmsResult<()> {
        let _guard = self.lock.lock().await;
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        info!(path = %self.path.display(), "[id-01] Creating empty key file");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.write_entries(&[]).await
    }

    async fn read_entries(&self) -> KmsResult<Vec<KeyFileEntry>> {
        let content = tokio::fs::read(&self.path).await?;
        if content.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&content)?)
    }

    async fn write_entries(&self, entries: &[KeyFileEntry]) -> KmsResult<()> {
        let content = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn encode_secret(&self, secret: &[u8]) -> KmsResult<String> {
        match &self.encryption_key {
            Some(key) => {
                let sealed = shared_crypto::seal(key, secret)?;
                Ok(format!("{ENCRYPTED_PREFIX}{}", hex::encode(sealed)))
            }
            None => Ok(format!("0x{}", hex::encode(secret))),
        }
    }

    fn decode_material(&self, key_type: KeyType, stored: &str) -> KmsResult<KeyMaterial> {
        let Some(sealed_hex) = stored.strip_prefix(ENCRYPTED_PREFIX) else {
            return KeyMaterial::from_hex(key_type, stored);
        };
        let key = self.encryption_key.as_ref().ok_or_else(|| {
            KmsError::InvalidKeyMaterial("key is encrypted but no file key configured".into())
        })?;
        let sealed =
            hex::decode(sealed_hex).map_err(|e| KmsError::InvalidKeyMaterial(e.to_string()))?;
        let secret = Zeroizing::new(shared_crypto::open(key, &sealed)?);
        KeyMaterial::from_secret(key_type, &secret)
    }

    /// Append a record.
    pub async fn save(&self, key_path: &str, material: &KeyMaterial) -> KmsResult<()> {
        let private_key = self.encode_secret(material.secret().as_slice())?;
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        entries.push(KeyFileEntry {
            key_path: key_path.to_string(),
            key_type: material.key_type().to_string(),
            private_key,
        });
        self.write_entries(&entries).await
    }

    /// Key ids of `key_type` whose path contains `owner`.
    pub async fn search_by_identity(&self, owner: &Did, key_type: KeyType) -> KmsResult<Vec<KeyId>> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.key_path.contains(owner.as_str()))
            .filter(|e| e.key_type.parse::<KeyType>().ok() == Some(key_type))
            .map(|e| KeyId::new(key_type, e.key_path))
            .collect())
    }

    /// Decrypted key material for an exact key path.
    pub async fn search_private_key(&self, key: &KeyId) -> KmsResult<KeyMaterial> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;
        let entry = entries
            .iter()
            .find(|e| e.key_path == key.id)
            .ok_or_else(|| KmsError::KeyNotFound(key.id.clone()))?;
        self.decode_material(key.key_type, &entry.private_key)
    }

    /// Rename an entry's key path.
    pub async fn rename(&self, from: &str, to: &str) -> KmsResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        let entry = entries
            .iter_mut()
            .find(|e| e.key_path == from)
            .ok_or_else(|| KmsError::KeyNotFound(from.to_string()))?;
        entry.key_path = to.to_string();
        self.write_entries(&entries).await
    }
}

/// Provider for one key type backed by a shared [`LocalKeyFile`].
pub struct LocalFileKeyProvider {
    key_type: KeyType,
    file: Arc<LocalKeyFile>,
}

impl LocalFileKeyProvider {
    pub fn new(key_type: KeyType, file: Arc<LocalKeyFile>) -> Self {
        Self { key_type, file }
    }

    fn check_type(&self, key: &KeyId) -> KmsResult<()> {
        if key.key_type != self.key_type {
            return Err(KmsError::NoProvider(key.key_type));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyProvider for LocalFileKeyProvider {
    fn key_type(&self) -> KeyType {
        self.key_type
    }

    async fn new_key(&self, owner: Option<&Did>) -> KmsResult<KeyId> {
        let material = KeyMaterial::generate(self.key_type);
        let path = key_path(owner, self.key_type, &material.public_key());
        self.file.save(&path, &material).await?;
        debug!(key_path = %path, "[id-01] Stored new key in local file");
        Ok(KeyId::new(self.key_type, path))
    }

    async fn link_to_identity(&self, key: &KeyId, owner: &Did) -> KmsResult<KeyId> {
        self.check_type(key)?;
        if key.id.contains('/') {
            return Err(KmsError::AlreadyLinked(key.id.clone()));
        }
        let linked = format!("{owner}/{}", key.id);
        self.file.rename(&key.id, &linked).await?;
        Ok(KeyId::new(self.key_type, linked))
    }

    async fn public_key(&self, key: &KeyId) -> KmsResult<Vec<u8>> {
        self.check_type(key)?;
        Ok(self.file.search_private_key(key).await?.public_key())
    }

    async fn sign(&self, key: &KeyId, payload: &[u8]) -> KmsResult<Vec<u8>> {
        self.check_type(key)?;
        self.file.search_private_key(key).await?.sign(payload)
    }

    async fn keys_by_identity(&self, owner: &Did) -> KmsResult<Vec<KeyId>> {
        self.file.search_by_identity(owner, self.key_type).await
    }
}
