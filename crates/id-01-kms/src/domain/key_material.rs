//! Private key material per key type.
//!
//! `Ethereum` keys are secp256k1 and sign 32-byte digests with a recoverable
//! signature (`r || s || v`). `BabyJubJub` keys are Edwards-curve keys
//! signing arbitrary messages with a 64-byte signature.

use crate::domain::errors::{KmsError, KmsResult};
use shared_crypto::{EddsaKeyPair, EthKeyPair};
use shared_types::{Did, KeyType};
use zeroize::Zeroizing;

/// Decoded private key for one of the supported key types.
pub enum KeyMaterial {
    Ethereum(EthKeyPair),
    BabyJubJub(EddsaKeyPair),
}

impl KeyMaterial {
    /// Generate fresh key material.
    pub fn generate(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Ethereum => KeyMaterial::Ethereum(EthKeyPair::generate()),
            KeyType::BabyJubJub => KeyMaterial::BabyJubJub(EddsaKeyPair::generate()),
        }
    }

    /// Rebuild key material from its raw 32-byte secret.
    pub fn from_secret(key_type: KeyType, secret: &[u8]) -> KmsResult<Self> {
        let material = match key_type {
            KeyType::Ethereum => KeyMaterial::Ethereum(EthKeyPair::from_bytes(secret)?),
            KeyType::BabyJubJub => KeyMaterial::BabyJubJub(EddsaKeyPair::from_seed(secret)?),
        };
        Ok(material)
    }

    /// Parse a `0x`-prefixed (or bare) hex secret.
    pub fn from_hex(key_type: KeyType, encoded: &str) -> KmsResult<Self> {
        let secret = Zeroizing::new(
            hex::decode(encoded.trim_start_matches("0x"))
                .map_err(|e| KmsError::InvalidKeyMaterial(e.to_string()))?,
        );
        Self::from_secret(key_type, &secret)
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            KeyMaterial::Ethereum(_) => KeyType::Ethereum,
            KeyMaterial::BabyJubJub(_) => KeyType::BabyJubJub,
        }
    }

    /// Raw secret bytes, wiped on drop.
    pub fn secret(&self) -> Zeroizing<[u8; 32]> {
        match self {
            KeyMaterial::Ethereum(kp) => Zeroizing::new(kp.to_bytes()),
            KeyMaterial::BabyJubJub(kp) => Zeroizing::new(kp.to_seed()),
        }
    }

    /// Public key bytes: 65-byte uncompressed SEC1 or 32-byte Edwards point.
    pub fn public_key(&self) -> Vec<u8> {
        match self {
            KeyMaterial::Ethereum(kp) => kp.public_key_uncompressed(),
            KeyMaterial::BabyJubJub(kp) => kp.public_key().as_bytes().to_vec(),
        }
    }

    /// Sign a payload.
    ///
    /// Ethereum keys only accept a 32-byte digest.
    pub fn sign(&self, payload: &[u8]) -> KmsResult<Vec<u8>> {
        match self {
            KeyMaterial::Ethereum(kp) => {
                let digest: &[u8; 32] = payload.try_into().map_err(|_| {
                    KmsError::InvalidPayload(format!(
                        "ETH keys sign 32-byte digests, got {} bytes",
                        payload.len()
                    ))
                })?;
                Ok(kp.sign_prehash(digest)?.as_bytes().to_vec())
            }
            KeyMaterial::BabyJubJub(kp) => Ok(kp.sign(payload).as_bytes().to_vec()),
        }
    }
}

/// Key path for a public key, scoped to `owner` when present.
///
/// `<did>/<TYPE>:<pubkey-hex>` or `<TYPE>:<pubkey-hex>` for keys created
/// before their identity exists.
pub fn key_path(owner: Option<&Did>, key_type: KeyType, public_key: &[u8]) -> String {
    let leaf = format!("{}:{}", key_type, hex::encode(public_key));
    match owner {
        Some(did) => format!("{did}/{leaf}"),
        None => leaf,
    }
}
