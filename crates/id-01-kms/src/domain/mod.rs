//! Domain layer: key material and errors.

pub mod errors;
pub mod key_material;

pub use errors::{KmsError, KmsResult};
pub use key_material::{key_path, KeyMaterial};
