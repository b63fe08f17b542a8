//! Blockchain node port.

use crate::domain::{GatewayResult, TransactionReceipt};
use async_trait::async_trait;
use primitive_types::U256;
use shared_types::{Address, Hash};

/// The subset of the Ethereum JSON-RPC surface the gateway needs.
///
/// Errors are [`GatewayError::Rpc`](crate::domain::GatewayError::Rpc); the
/// gateway decides whether a failed call is retried.
#[async_trait]
pub trait EthClient: Send + Sync {
    async fn chain_id(&self) -> GatewayResult<u64>;

    async fn gas_price(&self) -> GatewayResult<U256>;

    async fn block_number(&self) -> GatewayResult<u64>;

    /// Next nonce for `address`, counting pending transactions.
    async fn pending_nonce(&self, address: &Address) -> GatewayResult<u64>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> GatewayResult<Hash>;

    async fn transaction_receipt(&self, tx_hash: &Hash) -> GatewayResult<Option<TransactionReceipt>>;

    /// Read-only contract call against the latest block (`eth_call`).
    async fn call_contract(&self, to: &Address, data: &[u8]) -> GatewayResult<Vec<u8>>;
}
