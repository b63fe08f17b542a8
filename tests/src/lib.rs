//! # Issuer Test Suite
//!
//! Cross-subsystem scenarios run against the in-memory state store, the
//! in-memory dev chain, the native prover and a local-file KMS.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs          # Shared harness
//! └── integration/
//!     ├── publication.rs   # Single-identity lifecycle scenarios
//!     ├── concurrency.rs   # Replicas, worker pool, nonce sharing
//!     └── node.rs          # Fully wired node
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p id-tests
//! cargo test -p id-tests integration::concurrency::
//! ```

pub mod fixtures;
pub mod integration;
