//! # ID-05 Transaction Gateway
//!
//! Publishes identity state transitions to the state contract and waits
//! for them to become final.
//!
//! **Subsystem ID:** 05
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Failure Taxonomy
//!
//! | Error | Retryable | Meaning |
//! |-------|-----------|---------|
//! | `GasPriceExceeded` | yes | Network price above the ceiling; nothing sent |
//! | `SubmissionFailed` | yes | RPC errors exhausted the retry budget |
//! | `ConfirmationTimeout` | yes | No receipt or not deep enough in time |
//! | `Rejected` | no | The node refused the transaction outright |
//! | `TransactionReverted` | no | The contract rejected the transition |
//! | `Cancelled` | no | Shutdown while waiting; the transaction stands |
//!
//! ## Nonces
//!
//! The RPC endpoint and its nonce sequence are shared by every publishing
//! worker. Nonce allocation, signing and submission run inside a
//! per-signing-key critical section; different keys never contend.
//! A send whose response was lost is not re-signed at a new nonce until
//! the node's pending nonce shows it was never accepted.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryChain, JsonRpcEthClient};
pub use domain::{
    transit_state_selector, GatewayConfig, GatewayError, GatewayResult, LegacyTransaction,
    SendRejection, SignedTransaction, StateInfo, StateLookup, StateView, SubmittedTransaction,
    TransactionReceipt, TransactionStatus, TransitStateCall, TRANSIT_STATE_SIGNATURE,
};
pub use ports::EthClient;
pub use service::TransactionGateway;
