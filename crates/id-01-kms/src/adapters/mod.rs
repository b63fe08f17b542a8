//! # Adapters
//!
//! Concrete key providers.

pub mod local_file;
pub mod vault;

pub use local_file::{KeyFileEntry, LocalFileKeyProvider, LocalKeyFile};
pub use vault::{VaultConfig, VaultPluginKeyProvider};
