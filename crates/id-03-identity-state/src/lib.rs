//! # ID-03 Identity State Engine
//!
//! Identities, their pending claims and revocations, and the transitions
//! that fold those changes into a new identity state.
//!
//! **Subsystem ID:** 03
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## State Lifecycle
//!
//! ```text
//! pending ──► transacted ──► confirmed
//!    │            │
//!    └────────────┴──► failed ──► pending (resubmitted, same hash)
//! ```
//!
//! Every state except genesis records the last confirmed state it builds
//! on. At most one state per identity is `pending` or `transacted`; the
//! storage layer enforces this with conditional writes, so two workers
//! can never both create a transition for the same identity.
//!
//! ## Pending Changes
//!
//! `add_claim` and `revoke_claim` only record intent. The trees change in
//! [`IdentityStateEngine::compute_transition`], which applies all pending
//! additions, then all pending revocations, then snapshots both roots into
//! the Roots Tree, and commits trees and state atomically.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::InMemoryStateStore;
pub use domain::{
    auth_claim, auth_schema_hash, claim_index, claim_value, new_claim, roots_of,
    transition_message, EngineResult, IdentityGenesis, SignedTransition, StateEngineError,
    StateTransition, TransitionOutcome, AUTH_CLAIM_NONCE,
};
pub use ports::StateStorage;
pub use service::{EngineConfig, IdentityStateEngine};
