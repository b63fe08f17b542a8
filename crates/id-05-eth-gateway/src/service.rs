//! # Transaction Gateway
//!
//! Turns a `(new state, proof)` pair into a confirmed on-chain fact:
//!
//! 1. Encode the `transitState` call.
//! 2. Clamp the network gas price into `[min, max]`; above `max` fail with
//!    `GasPriceExceeded` before anything is signed.
//! 3. Under the signing key's lock: read the pending nonce, sign via the
//!    KMS, submit. Failed submissions are retried with fresh gas pricing up
//!    to the retry budget. A send that errored ambiguously is taken as
//!    accepted once the pending nonce has moved past it, so one call never
//!    spends two nonces.
//! 4. Poll for a receipt every `wait_receipt_cycle_time` until
//!    `receipt_timeout`.
//! 5. Poll the block number every `wait_block_cycle_time` until the receipt
//!    is `confirmation_block_count` blocks deep, bounded by
//!    `confirmation_timeout`.
//!
//! Every wait observes the shutdown signal. Cancelling never reverts a
//! submitted transaction; polling can resume later by hash.

use crate::domain::{
    decode_bool, GatewayConfig, GatewayError, GatewayResult, LegacyTransaction, SendRejection,
    SignedTransaction, StateInfo, StateLookup, StateView, SubmittedTransaction,
    TransactionReceipt, TransactionStatus, TransitStateCall,
};
use crate::ports::EthClient;
use dashmap::DashMap;
use id_01_kms::KeyManagement;
use primitive_types::U256;
use shared_crypto::{address_from_public_key, RecoverableSignature};
use shared_types::{hash_to_hex, Address, Hash, KeyId, KeyType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct TransactionGateway {
    client: Arc<dyn EthClient>,
    kms: Arc<dyn KeyManagement>,
    config: GatewayConfig,
    /// One critical section per signing key around nonce allocation.
    nonce_locks: DashMap<KeyId, Arc<Mutex<()>>>,
    addresses: DashMap<KeyId, Address>,
}

impl TransactionGateway {
    pub fn new(client: Arc<dyn EthClient>, kms: Arc<dyn KeyManagement>, config: GatewayConfig) -> Self {
        Self {
            client,
            kms,
            config,
            nonce_locks: DashMap::new(),
            addresses: DashMap::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn EthClient> {
        &self.client
    }

    /// Shared key that signs every identity's transactions, if configured.
    pub fn publishing_key(&self) -> Option<&KeyId> {
        self.config.publishing_key.as_ref()
    }

    /// Network gas price clamped into the configured range.
    pub async fn gas_price(&self) -> GatewayResult<U256> {
        let network = self.client.gas_price().await?;
        if network > self.config.max_gas_price {
            warn!(
                network = %network,
                max = %self.config.max_gas_price,
                "[id-05] Gas price above ceiling, not submitting"
            );
            return Err(GatewayError::GasPriceExceeded {
                network,
                max: self.config.max_gas_price,
            });
        }
        Ok(network.max(self.config.min_gas_price))
    }

    /// Ethereum address of `key`.
    pub async fn address_of(&self, key: &KeyId) -> GatewayResult<Address> {
        if let Some(address) = self.addresses.get(key) {
            return Ok(*address);
        }
        if key.key_type != KeyType::Ethereum {
            return Err(GatewayError::SubmissionFailed(format!(
                "{key} is not an Ethereum key"
            )));
        }
        let public_key = self.kms.public_key(key).await?;
        let address = address_from_public_key(&public_key)
            .map_err(|e| GatewayError::SubmissionFailed(format!("bad public key for {key}: {e}")))?;
        self.addresses.insert(key.clone(), address);
        Ok(address)
    }

    fn nonce_lock(&self, key: &KeyId) -> Arc<Mutex<()>> {
        self.nonce_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Sign and submit a `transitState` call with `key`.
    ///
    /// The key's nonce lock is held across every attempt.
    pub async fn submit_transit_state(
        &self,
        key: &KeyId,
        call: &TransitStateCall,
    ) -> GatewayResult<SubmittedTransaction> {
        let data = call.encode();
        let from = self.address_of(key).await?;
        let attempts = self.config.submission_retries + 1;
        let mut last_error = String::new();
        // Sent with an ambiguous error; the node may hold it.
        let mut unanswered: Option<SubmittedTransaction> = None;

        let lock = self.nonce_lock(key);
        let _guard = lock.lock().await;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
            let nonce = match self.client.pending_nonce(&from).await {
                Ok(nonce) => nonce,
                Err(GatewayError::Rpc(reason)) => {
                    warn!(attempt, attempts, %reason, "[id-05] Nonce lookup failed");
                    last_error = reason;
                    continue;
                }
                Err(other) => return Err(other),
            };
            if let Some(sent) = unanswered.take() {
                if nonce > sent.nonce {
                    info!(
                        tx = %hash_to_hex(&sent.tx_hash),
                        nonce = sent.nonce,
                        "[id-05] Unanswered submission was accepted"
                    );
                    return Ok(sent);
                }
            }

            // Gas is re-read on every attempt; a spike fails fast.
            let gas_price = self.gas_price().await?;
            let signed = self.sign(key, nonce, gas_price, data.clone()).await?;
            let submitted = SubmittedTransaction {
                tx_hash: signed.hash,
                nonce,
                gas_price,
                from,
            };

            match self.client.send_raw_transaction(&signed.raw).await {
                Ok(tx_hash) => {
                    if tx_hash != signed.hash {
                        debug!(
                            local = %hash_to_hex(&signed.hash),
                            remote = %hash_to_hex(&tx_hash),
                            "[id-05] Node reported a different transaction hash"
                        );
                    }
                    info!(
                        tx = %hash_to_hex(&tx_hash),
                        nonce,
                        gas_price = %gas_price,
                        attempt,
                        "[id-05] State transition submitted"
                    );
                    return Ok(SubmittedTransaction { tx_hash, ..submitted });
                }
                Err(GatewayError::Rpc(reason)) => match SendRejection::classify(&reason) {
                    SendRejection::AlreadyKnown => {
                        info!(
                            tx = %hash_to_hex(&signed.hash),
                            nonce,
                            "[id-05] Node already holds the transaction"
                        );
                        return Ok(submitted);
                    }
                    SendRejection::Permanent => {
                        warn!(%reason, "[id-05] Submission rejected");
                        return Err(GatewayError::Rejected(reason));
                    }
                    SendRejection::Stale => {
                        warn!(attempt, attempts, %reason, "[id-05] Submission refused, re-signing");
                        last_error = reason;
                    }
                    SendRejection::Ambiguous => {
                        warn!(attempt, attempts, %reason, "[id-05] Submission failed");
                        last_error = reason;
                        unanswered = Some(submitted);
                    }
                },
                Err(other) => return Err(other),
            }
        }

        if let Some(sent) = unanswered {
            // Last word on the final ambiguous send.
            if let Ok(nonce) = self.client.pending_nonce(&from).await {
                if nonce > sent.nonce {
                    info!(
                        tx = %hash_to_hex(&sent.tx_hash),
                        nonce = sent.nonce,
                        "[id-05] Unanswered submission was accepted"
                    );
                    return Ok(sent);
                }
            }
        }
        Err(GatewayError::SubmissionFailed(format!(
            "{attempts} attempts, last error: {last_error}"
        )))
    }

    async fn sign(
        &self,
        key: &KeyId,
        nonce: u64,
        gas_price: U256,
        data: Vec<u8>,
    ) -> GatewayResult<SignedTransaction> {
        let transaction = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit: self.config.default_gas_limit,
            to: self.config.contract_address,
            value: U256::zero(),
            data,
            chain_id: self.config.chain_id,
        };
        let signature = self.kms.sign(key, &transaction.signing_hash()).await?;
        let signature = RecoverableSignature::from_slice(&signature)
            .map_err(|e| GatewayError::SubmissionFailed(format!("signature from {key}: {e}")))?;
        Ok(transaction.into_signed(&signature))
    }

    /// The contract's record of `state` for identity `id`, if it has one.
    ///
    /// Independent of which transaction recorded it, so it also finds a
    /// state that landed through a transaction nobody is tracking.
    pub async fn recorded_state(&self, id: U256, state: &Hash) -> GatewayResult<Option<StateInfo>> {
        let lookup = StateLookup::new(id, *state);
        let contract = self.config.contract_address;
        let exists = self
            .client
            .call_contract(&contract, &lookup.encode(StateView::Exists))
            .await?;
        if !decode_bool(&exists)? {
            return Ok(None);
        }
        let info = self
            .client
            .call_contract(&contract, &lookup.encode(StateView::Info))
            .await?;
        Ok(Some(StateInfo::decode(&info)?))
    }

    /// One-shot status of `tx_hash`.
    pub async fn transaction_status(&self, tx_hash: &Hash) -> GatewayResult<TransactionStatus> {
        let Some(receipt) = self.client.transaction_receipt(tx_hash).await? else {
            return Ok(TransactionStatus::Pending);
        };
        if !receipt.status {
            return Ok(TransactionStatus::Reverted(receipt));
        }
        let head = self.client.block_number().await?;
        let confirmations = head.saturating_sub(receipt.block_number);
        if confirmations >= self.config.confirmation_block_count {
            Ok(TransactionStatus::Confirmed(receipt))
        } else {
            Ok(TransactionStatus::Included {
                block_number: receipt.block_number,
                confirmations,
            })
        }
    }

    /// Wait for `tx_hash` to be mined and buried at the confirmation depth.
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: &Hash,
        shutdown: &mut watch::Receiver<bool>,
    ) -> GatewayResult<TransactionReceipt> {
        let receipt = self.wait_for_receipt(tx_hash, shutdown).await?;
        if !receipt.status {
            warn!(
                tx = %hash_to_hex(tx_hash),
                block = receipt.block_number,
                "[id-05] Transaction reverted"
            );
            return Err(GatewayError::TransactionReverted {
                tx_hash: hash_to_hex(tx_hash),
                block_number: receipt.block_number,
            });
        }

        let head = self.wait_for_depth(receipt.block_number, shutdown).await?;
        info!(
            tx = %hash_to_hex(tx_hash),
            block = receipt.block_number,
            head,
            "[id-05] Transaction confirmed"
        );
        Ok(receipt)
    }

    /// Wait until `block_number` is `confirmation_block_count` blocks deep.
    /// Returns the head that satisfied it.
    pub async fn wait_for_depth(
        &self,
        block_number: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> GatewayResult<u64> {
        let target = block_number + self.config.confirmation_block_count;
        let deadline = Instant::now() + self.config.confirmation_timeout;
        loop {
            match self.client.block_number().await {
                Ok(head) if head >= target => return Ok(head),
                Ok(head) => debug!(head, target, "[id-05] Waiting for confirmations"),
                Err(e) => warn!(error = %e, "[id-05] Block number poll failed"),
            }
            if Instant::now() >= deadline {
                return Err(GatewayError::ConfirmationTimeout(format!(
                    "block {block_number} not {} blocks deep within {:?}",
                    self.config.confirmation_block_count, self.config.confirmation_timeout
                )));
            }
            pause(self.config.wait_block_cycle_time, shutdown).await?;
        }
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: &Hash,
        shutdown: &mut watch::Receiver<bool>,
    ) -> GatewayResult<TransactionReceipt> {
        let deadline = Instant::now() + self.config.receipt_timeout;
        loop {
            match self.client.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "[id-05] Receipt poll failed"),
            }
            if Instant::now() >= deadline {
                return Err(GatewayError::ConfirmationTimeout(format!(
                    "no receipt for {} within {:?}",
                    hash_to_hex(tx_hash),
                    self.config.receipt_timeout
                )));
            }
            pause(self.config.wait_receipt_cycle_time, shutdown).await?;
        }
    }
}

/// Sleep for `period` unless shutdown is signalled first.
async fn pause(period: Duration, shutdown: &mut watch::Receiver<bool>) -> GatewayResult<()> {
    if *shutdown.borrow() {
        return Err(GatewayError::Cancelled);
    }
    tokio::select! {
        _ = tokio::time::sleep(period) => Ok(()),
        changed = shutdown.changed() => match changed {
            Ok(()) if *shutdown.borrow() => Err(GatewayError::Cancelled),
            Ok(()) => Ok(()),
            // Sender gone: nobody can cancel any more.
            Err(_) => {
                tokio::time::sleep(period).await;
                Ok(())
            }
        },
    }
}
