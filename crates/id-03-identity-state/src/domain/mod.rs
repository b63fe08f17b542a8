pub mod claims;
pub mod errors;
pub mod transition;

pub use claims::{auth_claim, auth_schema_hash, claim_index, claim_value, new_claim, AUTH_CLAIM_NONCE};
pub use errors::{EngineResult, StateEngineError};
pub use transition::{
    roots_of, transition_message, IdentityGenesis, SignedTransition, StateTransition,
    TransitionOutcome,
};
