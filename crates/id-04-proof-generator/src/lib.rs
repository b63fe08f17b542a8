//! # ID-04 Proof Generator
//!
//! Proves that an identity moved from one state to the next.
//!
//! **Subsystem ID:** 04
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Strategies
//!
//! | Strategy | Adapter | Where the work runs |
//! |----------|---------|---------------------|
//! | Native | [`NativeProver`] | In-process, Goldilocks-field witness |
//! | Remote | [`RemoteProver`] | External proving service over HTTP |
//!
//! The strategy is a static configuration choice made at startup. Both sit
//! behind [`ZkGenerator`], so the publisher never knows which one runs.
//!
//! A failure is [`ProofError::ProofGenerationFailed`] (or a transport
//! error for the remote strategy). The state stays `pending` and the next
//! publication cycle tries again with the same inputs.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::{NativeProver, RemoteProver, RemoteProverConfig};
pub use domain::{
    check_constraints, prove, verify, FieldElement, ProofError, ProofResult,
    StateTransitionInputs, WitnessCommitment, ZkProof,
};
pub use ports::ZkGenerator;
