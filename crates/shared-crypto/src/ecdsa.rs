//! # ECDSA Signatures (secp256k1)
//!
//! Ethereum-compatible recoverable ECDSA over prehashed messages.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization (EIP-2)
//! - Constant-time operations

use crate::hashing::keccak256;
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use zeroize::Zeroize;

/// Recoverable signature: `r (32) || s (32) || recovery id (1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoverableSignature([u8; 65]);

impl RecoverableSignature {
    /// Create from bytes (65 bytes).
    pub fn from_bytes(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice, rejecting wrong lengths.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// The `r` component.
    pub fn r(&self) -> [u8; 32] {
        let mut r = [0u8; 32];
        r.copy_from_slice(&self.0[..32]);
        r
    }

    /// The `s` component.
    pub fn s(&self) -> [u8; 32] {
        let mut s = [0u8; 32];
        s.copy_from_slice(&self.0[32..64]);
        s
    }

    /// Recovery id (0 or 1).
    pub fn recovery_id(&self) -> u8 {
        self.0[64]
    }
}

/// secp256k1 keypair holding an Ethereum account key.
pub struct EthKeyPair {
    signing_key: SigningKey,
}

impl EthKeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Uncompressed SEC1 public key (65 bytes, `0x04` prefix).
    pub fn public_key_uncompressed(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Ethereum address of this key.
    pub fn address(&self) -> [u8; 20] {
        address_from_verifying_key(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte prehash, returning a recoverable signature.
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<RecoverableSignature, CryptoError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(RecoverableSignature(bytes))
    }

    /// Get secret key bytes (for serialization).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }
}

impl Drop for EthKeyPair {
    fn drop(&mut self) {
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

/// Derive the Ethereum address from an uncompressed SEC1 public key.
pub fn address_from_public_key(uncompressed: &[u8]) -> Result<[u8; 20], CryptoError> {
    let key = VerifyingKey::from_sec1_bytes(uncompressed).map_err(|_| CryptoError::InvalidPublicKey)?;
    Ok(address_from_verifying_key(&key))
}

/// Recover the signer address of a prehash.
pub fn recover_address(
    prehash: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<[u8; 20], CryptoError> {
    let sig = Signature::from_slice(&signature.as_bytes()[..64])
        .map_err(|_| CryptoError::InvalidSignature)?;
    let recovery_id =
        RecoveryId::from_byte(signature.recovery_id()).ok_or(CryptoError::InvalidSignature)?;
    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
        .map_err(|_| CryptoError::SignatureVerificationFailed)?;
    Ok(address_from_verifying_key(&key))
}

fn address_from_verifying_key(key: &VerifyingKey) -> [u8; 20] {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag; the address is the low 20 bytes of the hash.
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}
