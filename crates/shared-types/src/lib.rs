//! # Shared Types Crate
//!
//! This crate contains the domain entities shared by every issuer subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **References, not material**: Key identifiers are opaque handles; no
//!   private key bytes ever cross a crate boundary through these types.
//! - **State chaining**: `IdentityState::previous_state` links every state to
//!   the last confirmed one, giving a total order per identity.

pub mod did;
pub mod entities;
pub mod errors;

pub use did::{Did, DidError};
pub use entities::*;
pub use errors::*;
