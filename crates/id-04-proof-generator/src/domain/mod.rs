pub mod commitment;
pub mod errors;
pub mod field;
pub mod inputs;
pub mod proof;

pub use commitment::{Opening, WitnessCommitment};
pub use errors::{ProofError, ProofResult};
pub use field::{FieldElement, GOLDILOCKS_PRIME};
pub use inputs::StateTransitionInputs;
pub use proof::{check_constraints, prove, verify, ZkProof};
