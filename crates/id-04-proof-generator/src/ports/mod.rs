pub mod prover;

pub use prover::ZkGenerator;
