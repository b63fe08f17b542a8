//! Gateway configuration and chain-facing records.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Hash, KeyId};
use std::time::Duration;

/// Transaction and confirmation parameters.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub contract_address: Address,
    pub chain_id: u64,
    pub default_gas_limit: u64,
    pub min_gas_price: U256,
    pub max_gas_price: U256,
    /// Deadline for a receipt to appear.
    pub receipt_timeout: Duration,
    pub wait_receipt_cycle_time: Duration,
    /// Deadline for the confirmation depth after inclusion.
    pub confirmation_timeout: Duration,
    pub confirmation_block_count: u64,
    pub wait_block_cycle_time: Duration,
    /// Extra submission attempts after the first one fails.
    pub submission_retries: u32,
    pub retry_backoff: Duration,
    /// Shared key used for every identity; otherwise each identity's own.
    pub publishing_key: Option<KeyId>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            contract_address: [0u8; 20],
            chain_id: 80002,
            default_gas_limit: 600_000,
            min_gas_price: U256::from(1_000_000_000u64),
            max_gas_price: U256::from(300_000_000_000u64),
            receipt_timeout: Duration::from_secs(600),
            wait_receipt_cycle_time: Duration::from_secs(5),
            confirmation_timeout: Duration::from_secs(600),
            confirmation_block_count: 5,
            wait_block_cycle_time: Duration::from_secs(5),
            submission_retries: 3,
            retry_backoff: Duration::from_secs(2),
            publishing_key: None,
        }
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: Hash,
    pub block_number: u64,
    /// `true` for success, `false` for reverted.
    pub status: bool,
    pub gas_used: u64,
}

/// A transaction accepted by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub tx_hash: Hash,
    pub nonce: u64,
    pub gas_price: U256,
    pub from: Address,
}

/// Transaction progress as seen by a single status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// No receipt yet.
    Pending,
    /// Mined, waiting for depth.
    Included { block_number: u64, confirmations: u64 },
    Confirmed(TransactionReceipt),
    Reverted(TransactionReceipt),
}
