//! Key management errors.

use shared_types::KeyType;
use thiserror::Error;

/// Errors raised by the KMS and its providers.
#[derive(Debug, Error)]
pub enum KmsError {
    /// A provider for this key type is already registered.
    #[error("Provider for key type {0} already registered")]
    DuplicateProvider(KeyType),

    /// No provider registered for this key type.
    #[error("No provider registered for key type {0}")]
    NoProvider(KeyType),

    /// Key not present in the backend.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Payload shape not accepted for this key type.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Stored key material could not be decoded.
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Key already linked to a different identity.
    #[error("Key {0} is already bound to an identity")]
    AlreadyLinked(String),

    /// Local key file I/O failure.
    #[error("Key file error: {0}")]
    Storage(String),

    /// Remote backend failure.
    #[error("Vault request failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Crypto(#[from] shared_crypto::CryptoError),
}

impl From<std::io::Error> for KmsError {
    fn from(err: std::io::Error) -> Self {
        KmsError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for KmsError {
    fn from(err: serde_json::Error) -> Self {
        KmsError::Storage(format!("malformed key file: {err}"))
    }
}

pub type KmsResult<T> = Result<T, KmsError>;
