//! # Shared Crypto - Issuer Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | XChaCha20-Poly1305 | Local key file encryption |
//! | `hashing` | Keccak-256 | Tree nodes, state hashes, transaction hashes |
//! | `eddsa` | Ed25519 | Identity state signatures |
//! | `ecdsa` | secp256k1 | Ethereum transaction signing |
//!
//! ## Security Properties
//!
//! - **XChaCha20**: 192-bit nonce, constant-time, side-channel immune
//! - **Ed25519**: Deterministic nonces, no RNG dependency
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization (EIP-2),
//!   recoverable signatures with Ethereum `v`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod eddsa;
pub mod errors;
pub mod hashing;
pub mod symmetric;

// Re-exports
pub use ecdsa::{address_from_public_key, recover_address, EthKeyPair, RecoverableSignature};
pub use eddsa::{EddsaKeyPair, EddsaPublicKey, EddsaSignature};
pub use errors::CryptoError;
pub use hashing::{keccak256, keccak256_many, KeccakHasher};
pub use symmetric::{decrypt, encrypt, open, seal, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
