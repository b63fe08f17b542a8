//! # JSON-RPC Client
//!
//! [`EthClient`] over HTTP JSON-RPC 2.0. Quantities travel as `0x`-prefixed
//! hex strings.

use crate::domain::{GatewayError, GatewayResult, TransactionReceipt};
use crate::ports::EthClient;
use async_trait::async_trait;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{Address, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
    gas_used: Option<String>,
}

pub struct JsonRpcEthClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcEthClient {
    pub fn new(url: impl Into<String>, response_timeout: Duration) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(response_timeout)
            .build()
            .map_err(|e| GatewayError::Rpc(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> GatewayResult<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        trace!(method, id = request.id, "[id-05] JSON-RPC call");

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Rpc(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| GatewayError::Rpc(format!("{method}: malformed response: {e}")))?;

        if let Some(error) = response.error {
            return Err(GatewayError::Rpc(format!(
                "{method}: {} (code {})",
                error.message, error.code
            )));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn quantity(&self, method: &str, params: Value) -> GatewayResult<U256> {
        let value = self.request(method, params).await?;
        let text = value
            .as_str()
            .ok_or_else(|| GatewayError::Rpc(format!("{method}: expected hex quantity")))?;
        parse_quantity(text)
    }
}

pub fn parse_quantity(text: &str) -> GatewayResult<U256> {
    let digits = text.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| GatewayError::Rpc(format!("bad quantity '{text}': {e:?}")))
}

fn quantity_u64(text: &str) -> GatewayResult<u64> {
    let value = parse_quantity(text)?;
    if value > U256::from(u64::MAX) {
        return Err(GatewayError::Rpc(format!("quantity '{text}' overflows u64")));
    }
    Ok(value.low_u64())
}

pub fn parse_hash(text: &str) -> GatewayResult<Hash> {
    let bytes = hex::decode(text.trim_start_matches("0x"))
        .map_err(|e| GatewayError::Rpc(format!("bad hash '{text}': {e}")))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| GatewayError::Rpc(format!("hash '{text}' is not 32 bytes")))
}

fn parse_receipt(value: Value) -> GatewayResult<Option<TransactionReceipt>> {
    if value.is_null() {
        return Ok(None);
    }
    let receipt: RpcReceipt =
        serde_json::from_value(value).map_err(|e| GatewayError::Rpc(format!("receipt: {e}")))?;
    // Some nodes return a receipt without a block while the tx is pending.
    let Some(block) = receipt.block_number else {
        return Ok(None);
    };
    Ok(Some(TransactionReceipt {
        tx_hash: parse_hash(&receipt.transaction_hash)?,
        block_number: quantity_u64(&block)?,
        status: receipt.status.as_deref().map(quantity_u64).transpose()? != Some(0),
        gas_used: receipt
            .gas_used
            .as_deref()
            .map(quantity_u64)
            .transpose()?
            .unwrap_or_default(),
    }))
}

#[async_trait]
impl EthClient for JsonRpcEthClient {
    async fn chain_id(&self) -> GatewayResult<u64> {
        Ok(self.quantity("eth_chainId", json!([])).await?.low_u64())
    }

    async fn gas_price(&self) -> GatewayResult<U256> {
        self.quantity("eth_gasPrice", json!([])).await
    }

    async fn block_number(&self) -> GatewayResult<u64> {
        Ok(self.quantity("eth_blockNumber", json!([])).await?.low_u64())
    }

    async fn pending_nonce(&self, address: &Address) -> GatewayResult<u64> {
        let address = format!("0x{}", hex::encode(address));
        Ok(self
            .quantity("eth_getTransactionCount", json!([address, "pending"]))
            .await?
            .low_u64())
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> GatewayResult<Hash> {
        let value = self
            .request(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        let text = value
            .as_str()
            .ok_or_else(|| GatewayError::Rpc("eth_sendRawTransaction: expected hash".into()))?;
        parse_hash(text)
    }

    async fn transaction_receipt(&self, tx_hash: &Hash) -> GatewayResult<Option<TransactionReceipt>> {
        let value = self
            .request(
                "eth_getTransactionReceipt",
                json!([format!("0x{}", hex::encode(tx_hash))]),
            )
            .await?;
        parse_receipt(value)
    }

    async fn call_contract(&self, to: &Address, data: &[u8]) -> GatewayResult<Vec<u8>> {
        let value = self
            .request(
                "eth_call",
                json!([
                    {
                        "to": format!("0x{}", hex::encode(to)),
                        "data": format!("0x{}", hex::encode(data)),
                    },
                    "latest"
                ]),
            )
            .await?;
        let text = value
            .as_str()
            .ok_or_else(|| GatewayError::Rpc("eth_call: expected hex data".into()))?;
        hex::decode(text.trim_start_matches("0x"))
            .map_err(|e| GatewayError::Rpc(format!("eth_call: bad data: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), U256::zero());
        assert_eq!(parse_quantity("0x").unwrap(), U256::zero());
        assert_eq!(parse_quantity("0x3b9aca00").unwrap(), U256::from(1_000_000_000u64));
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_receipt() {
        let hash = format!("0x{}", "ab".repeat(32));
        let receipt = parse_receipt(json!({
            "transactionHash": hash,
            "blockNumber": "0x10",
            "status": "0x0",
            "gasUsed": "0x5208"
        }))
        .unwrap()
        .unwrap();
        assert_eq!(receipt.block_number, 16);
        assert!(!receipt.status);
        assert_eq!(receipt.gas_used, 21000);

        assert!(parse_receipt(Value::Null).unwrap().is_none());
        assert!(parse_receipt(json!({"transactionHash": hash, "blockNumber": null}))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_rpc_error() {
        let client = JsonRpcEthClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(matches!(client.gas_price().await, Err(GatewayError::Rpc(_))));
    }
}
