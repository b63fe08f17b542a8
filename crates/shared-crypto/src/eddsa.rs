//! # Identity State Signatures
//!
//! Edwards-curve signatures over state hashes. Identity (BabyJubJub-typed)
//! keys are realised with Ed25519; the circuit only sees the signature as an
//! opaque witness input.

use crate::CryptoError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroize;

/// Edwards public key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EddsaPublicKey([u8; 32]);

impl EddsaPublicKey {
    /// Create from bytes, validating the point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        VerifyingKey::from_bytes(&array).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &EddsaSignature) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// Edwards signature (64 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EddsaSignature([u8; 64]);

impl EddsaSignature {
    /// Parse from a slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// Identity signing keypair.
pub struct EddsaKeyPair {
    signing_key: SigningKey,
}

impl EddsaKeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Restore from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 32] = seed.try_into().map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&array),
        })
    }

    /// Get public key.
    pub fn public_key(&self) -> EddsaPublicKey {
        EddsaPublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message (deterministic).
    pub fn sign(&self, message: &[u8]) -> EddsaSignature {
        EddsaSignature(self.signing_key.sign(message).to_bytes())
    }

    /// Get secret seed (for serialization).
    pub fn to_seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Drop for EddsaKeyPair {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_state_hash() {
        let keypair = EddsaKeyPair::generate();
        let state = [0x42u8; 32];

        let signature = keypair.sign(&state);
        assert!(keypair.public_key().verify(&state, &signature).is_ok());
        assert!(keypair.public_key().verify(&[0x43u8; 32], &signature).is_err());
    }

    #[test]
    fn test_seed_roundtrip() {
        let original = EddsaKeyPair::generate();
        let restored = EddsaKeyPair::from_seed(&original.to_seed()).unwrap();
        assert_eq!(original.public_key(), restored.public_key());
    }

    #[test]
    fn test_bad_lengths_rejected() {
        assert!(EddsaKeyPair::from_seed(&[1u8; 31]).is_err());
        assert!(EddsaPublicKey::from_bytes(&[1u8; 33]).is_err());
        assert!(EddsaSignature::from_slice(&[0u8; 10]).is_err());
    }
}
