//! # In-Memory Dev Chain
//!
//! A single-node chain with the state contract built in. Used when no
//! Ethereum endpoint is configured and by tests.
//!
//! Transactions are fully validated: RLP decoding, EIP-155 chain id,
//! sender recovery and nonce order. Mined `transitState` calls run the
//! contract rules:
//!
//! - genesis transitions require no recorded state for the id
//! - other transitions require `oldState` to equal the recorded state
//!
//! A failing rule produces a reverted receipt. Every recorded state is
//! kept with its block so the `stateExists` / `getStateInfoByIdAndState`
//! views answer like the deployed contract.

use crate::domain::{
    encode_bool, GatewayError, GatewayResult, SignedTransaction, StateInfo, StateLookup,
    StateView, TransactionReceipt, TransitStateCall,
};
use crate::ports::EthClient;
use async_trait::async_trait;
use parking_lot::Mutex;
use primitive_types::U256;
use shared_types::{hash_to_hex, Address, Hash, ZERO_HASH};
use std::collections::HashMap;
use tracing::debug;

const TRANSIT_GAS_USED: u64 = 210_000;
const TRANSFER_GAS_USED: u64 = 21_000;
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_TIME_SECS: u64 = 2;

struct PendingTransaction {
    hash: Hash,
    to: Address,
    data: Vec<u8>,
}

struct ChainState {
    block_number: u64,
    gas_price: U256,
    nonces: HashMap<Address, u64>,
    mempool: Vec<PendingTransaction>,
    receipts: HashMap<Hash, TransactionReceipt>,
    states: HashMap<U256, Hash>,
    history: HashMap<(U256, Hash), StateInfo>,
    auto_mine: bool,
    include_transactions: bool,
    failing_sends: u32,
    lost_responses: u32,
    revert_next: bool,
}

pub struct InMemoryChain {
    chain_id: u64,
    contract: Address,
    state: Mutex<ChainState>,
}

impl InMemoryChain {
    pub fn new(chain_id: u64, contract: Address) -> Self {
        Self {
            chain_id,
            contract,
            state: Mutex::new(ChainState {
                block_number: 1,
                gas_price: U256::from(30_000_000_000u64),
                nonces: HashMap::new(),
                mempool: Vec::new(),
                receipts: HashMap::new(),
                states: HashMap::new(),
                history: HashMap::new(),
                auto_mine: true,
                include_transactions: true,
                failing_sends: 0,
                lost_responses: 0,
                revert_next: false,
            }),
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn set_gas_price(&self, price: U256) {
        self.state.lock().gas_price = price;
    }

    /// When on, every block-number or receipt query mines one block.
    pub fn set_auto_mine(&self, on: bool) {
        self.state.lock().auto_mine = on;
    }

    /// When off, accepted transactions stay in the mempool forever.
    pub fn set_include_transactions(&self, on: bool) {
        self.state.lock().include_transactions = on;
    }

    /// Reject the next `count` submissions with an RPC error.
    pub fn fail_next_sends(&self, count: u32) {
        self.state.lock().failing_sends = count;
    }

    /// Accept the next `count` submissions but answer with an RPC error,
    /// as a timed-out request whose transaction still reached the node.
    pub fn lose_next_send_responses(&self, count: u32) {
        self.state.lock().lost_responses = count;
    }

    /// Revert the next mined contract call regardless of its arguments.
    pub fn revert_next(&self) {
        self.state.lock().revert_next = true;
    }

    /// Forget every transaction still in the mempool, as a node restart
    /// would. Sender nonces are not rolled back.
    pub fn drop_pending_transactions(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.mempool.len();
        state.mempool.clear();
        dropped
    }

    pub fn mine_block(&self) -> u64 {
        let mut state = self.state.lock();
        self.mine(&mut state)
    }

    pub fn mine_blocks(&self, count: u64) -> u64 {
        let mut state = self.state.lock();
        for _ in 0..count {
            self.mine(&mut state);
        }
        state.block_number
    }

    /// State recorded by the contract for `id`.
    pub fn state_of(&self, id: &U256) -> Option<Hash> {
        self.state.lock().states.get(id).copied()
    }

    /// Number of transactions accepted so far.
    pub fn accepted_transactions(&self) -> usize {
        let state = self.state.lock();
        state.receipts.len() + state.mempool.len()
    }

    fn mine(&self, state: &mut ChainState) -> u64 {
        state.block_number += 1;
        let block_number = state.block_number;
        if !state.include_transactions {
            return block_number;
        }

        for tx in std::mem::take(&mut state.mempool) {
            let (status, gas_used) = if tx.to == self.contract {
                let forced = std::mem::take(&mut state.revert_next);
                (!forced && self.execute(state, &tx.data, block_number), TRANSIT_GAS_USED)
            } else {
                (true, TRANSFER_GAS_USED)
            };
            debug!(
                tx = %hash_to_hex(&tx.hash),
                block = block_number,
                status,
                "[id-05] Dev chain mined transaction"
            );
            state.receipts.insert(
                tx.hash,
                TransactionReceipt {
                    tx_hash: tx.hash,
                    block_number,
                    status,
                    gas_used,
                },
            );
        }
        block_number
    }

    fn execute(&self, state: &mut ChainState, data: &[u8], block_number: u64) -> bool {
        let Ok(call) = TransitStateCall::decode(data) else {
            return false;
        };
        let recorded = state.states.get(&call.id).copied();
        let valid = match recorded {
            None => call.is_old_state_genesis,
            Some(current) => !call.is_old_state_genesis && current == call.old_state,
        };
        let known = state.history.contains_key(&(call.id, call.new_state));
        if !valid || known || call.new_state == ZERO_HASH {
            return false;
        }

        let timestamp = GENESIS_TIMESTAMP + block_number * BLOCK_TIME_SECS;
        if let Some(previous) = recorded.and_then(|old| state.history.get_mut(&(call.id, old))) {
            previous.replaced_by_state = call.new_state;
            previous.replaced_at_timestamp = timestamp;
            previous.replaced_at_block = block_number;
        }
        state.history.insert(
            (call.id, call.new_state),
            StateInfo {
                id: call.id,
                state: call.new_state,
                replaced_by_state: ZERO_HASH,
                created_at_timestamp: timestamp,
                replaced_at_timestamp: 0,
                created_at_block: block_number,
                replaced_at_block: 0,
            },
        );
        state.states.insert(call.id, call.new_state);
        true
    }

    fn auto_mine(&self) {
        let mut state = self.state.lock();
        if state.auto_mine {
            self.mine(&mut state);
        }
    }
}

#[async_trait]
impl EthClient for InMemoryChain {
    async fn chain_id(&self) -> GatewayResult<u64> {
        Ok(self.chain_id)
    }

    async fn gas_price(&self) -> GatewayResult<U256> {
        Ok(self.state.lock().gas_price)
    }

    async fn block_number(&self) -> GatewayResult<u64> {
        self.auto_mine();
        Ok(self.state.lock().block_number)
    }

    async fn pending_nonce(&self, address: &Address) -> GatewayResult<u64> {
        Ok(self.state.lock().nonces.get(address).copied().unwrap_or_default())
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> GatewayResult<Hash> {
        let mut state = self.state.lock();
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(GatewayError::Rpc("connection reset by peer".into()));
        }

        let (signed, sender) =
            SignedTransaction::decode(raw).map_err(|e| GatewayError::Rpc(e.to_string()))?;
        let tx = &signed.transaction;
        if tx.chain_id != self.chain_id {
            return Err(GatewayError::Rpc(format!(
                "invalid chain id {} (expected {})",
                tx.chain_id, self.chain_id
            )));
        }
        if state.receipts.contains_key(&signed.hash)
            || state.mempool.iter().any(|p| p.hash == signed.hash)
        {
            return Err(GatewayError::Rpc("already known".into()));
        }
        let expected = state.nonces.get(&sender).copied().unwrap_or_default();
        if tx.nonce < expected {
            return Err(GatewayError::Rpc(format!(
                "nonce too low: next nonce {expected}, tx nonce {}",
                tx.nonce
            )));
        }
        if tx.nonce > expected {
            return Err(GatewayError::Rpc(format!(
                "nonce too high: next nonce {expected}, tx nonce {}",
                tx.nonce
            )));
        }

        state.nonces.insert(sender, expected + 1);
        state.mempool.push(PendingTransaction {
            hash: signed.hash,
            to: tx.to,
            data: tx.data.clone(),
        });
        if state.lost_responses > 0 {
            state.lost_responses -= 1;
            return Err(GatewayError::Rpc("request timed out".into()));
        }
        Ok(signed.hash)
    }

    async fn transaction_receipt(&self, tx_hash: &Hash) -> GatewayResult<Option<TransactionReceipt>> {
        self.auto_mine();
        Ok(self.state.lock().receipts.get(tx_hash).cloned())
    }

    async fn call_contract(&self, to: &Address, data: &[u8]) -> GatewayResult<Vec<u8>> {
        if *to != self.contract {
            return Err(GatewayError::Rpc("execution reverted: no contract code".into()));
        }
        let (view, lookup) = StateLookup::decode(data)
            .map_err(|e| GatewayError::Rpc(format!("execution reverted: {e}")))?;
        let state = self.state.lock();
        let info = state.history.get(&(lookup.id, lookup.state));
        match view {
            StateView::Exists => Ok(encode_bool(info.is_some())),
            StateView::Info => info
                .map(StateInfo::encode)
                .ok_or_else(|| GatewayError::Rpc("execution reverted: State does not exist".into())),
        }
    }
}
