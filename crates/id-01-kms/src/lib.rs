//! # ID-01 Key Management
//!
//! Private-key custody behind a uniform signing capability.
//!
//! **Subsystem ID:** 01
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Purpose
//!
//! The rest of the issuer never touches key material. It holds [`KeyId`]
//! references and asks the [`Kms`] to:
//! - create a key of a given [`KeyType`], optionally scoped to a DID
//! - sign a payload with a key
//! - list the keys owned by a DID
//!
//! ## Providers
//!
//! | Backend | Storage | Adapter |
//! |---------|---------|---------|
//! | Local file | JSON records, optional XChaCha20-Poly1305 | [`LocalFileKeyProvider`] |
//! | Vault plugin | Remote secrets engine over HTTP | [`VaultPluginKeyProvider`] |
//!
//! Providers are registered per key type on a [`KmsBuilder`] at startup.
//! A built [`Kms`] is immutable, so lookups never race registration.
//!
//! ## Module Structure
//!
//! ```text
//! id-01-kms/
//! ├── domain/     # KeyMaterial, key paths, KmsError
//! ├── ports/      # KeyManagement (inbound), KeyProvider (outbound)
//! ├── adapters/   # local file + vault plugin providers
//! └── service.rs  # Kms registry
//! ```
//!
//! [`KeyId`]: shared_types::KeyId
//! [`KeyType`]: shared_types::KeyType

#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{LocalFileKeyProvider, LocalKeyFile, VaultConfig, VaultPluginKeyProvider};
pub use domain::{key_path, KeyMaterial, KmsError, KmsResult};
pub use ports::{KeyManagement, KeyProvider};
pub use service::{Kms, KmsBuilder};
