//! # Issuer Node Runtime
//!
//! Library half of the `node-runtime` binary, exposed for tests.
//!
//! - `config` - `ISSUER_*` environment configuration
//! - `logging` - tracing subscriber setup
//! - `wiring` - builds and starts the subsystems
//! - `rhs` - reverse-hash notification forwarder

pub mod config;
pub mod logging;
pub mod rhs;
pub mod wiring;

pub use config::{ConfigError, IssuerConfig};
pub use wiring::{IssuerNode, NodeError};
