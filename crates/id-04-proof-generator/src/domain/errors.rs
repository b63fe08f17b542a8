//! Proof generation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProofError {
    /// The transition does not satisfy the circuit, or the prover failed.
    /// Fatal to the current publication attempt.
    #[error("Proof generation failed: {0}")]
    ProofGenerationFailed(String),

    /// The remote prover did not answer within the response timeout.
    #[error("Prover did not respond within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Prover transport error: {0}")]
    Transport(String),

    #[error("Malformed prover response: {0}")]
    MalformedResponse(String),

    #[error("Proof verification failed: {0}")]
    VerificationFailed(String),
}

pub type ProofResult<T> = Result<T, ProofError>;
