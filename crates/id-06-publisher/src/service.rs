//! # Publisher
//!
//! Drives one identity through engine → prover → gateway as a single
//! publication attempt, and fans attempts out across identities.
//!
//! ## Single flight
//!
//! The engine only creates a transition when the identity has no
//! `pending`/`transacted` state. An existing in-flight state is resumed
//! only after `acquire_lease` wins the compare-and-set on its lease, so a
//! second publisher (in this process or another replica) gets
//! `PublicationInProgress` and touches nothing.
//!
//! ## Attempt outcomes
//!
//! | Failure | Persisted status | Next cycle |
//! |---------|------------------|------------|
//! | Proof generation | stays `pending`, lease released | re-proves |
//! | Gas price above ceiling | stays `pending`, lease released | retries |
//! | Submission budget exhausted | `failed` | reopened, same hash |
//! | Receipt / confirmation timeout | `failed` | reopened, same hash |
//! | Reverted | `failed` | reopened, same hash |
//! | Shutdown while waiting | stays `transacted`, lease released | resumes by hash |
//!
//! ## Already on chain
//!
//! Before proving, every attempt asks the contract whether the new state is
//! already recorded for the identity. A state that landed through an
//! earlier transaction (a stuck one that mined late, or one whose send
//! response was lost) is confirmed from the contract's record instead of
//! being submitted again.

use crate::domain::{PublicationOutcome, PublishError, PublishReport, PublishResult};
use chrono::Utc;
use id_03_identity_state::{IdentityStateEngine, StateEngineError, StateStorage, TransitionOutcome};
use id_04_proof_generator::{StateTransitionInputs, ZkGenerator};
use id_05_eth_gateway::{GatewayError, TransactionGateway, TransactionStatus, TransitStateCall};
use shared_bus::{EventPublisher, IssuerEvent};
use shared_types::{short_hex, Did, IdentityState, StateStatus, StorageError};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Upper bound on concurrent publication attempts.
    pub max_concurrent: usize,
    pub publish_interval: Duration,
    /// Lease held on an in-flight state. Must outlast a full confirmation
    /// wait (receipt timeout plus confirmation timeout).
    pub lease_duration: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            publish_interval: Duration::from_secs(30),
            lease_duration: Duration::from_secs(1800),
        }
    }
}

pub struct Publisher<S: ?Sized> {
    engine: Arc<IdentityStateEngine<S>>,
    prover: Arc<dyn ZkGenerator>,
    gateway: Arc<TransactionGateway>,
    events: Arc<dyn EventPublisher>,
    config: PublisherConfig,
    workers: Arc<Semaphore>,
}

/// Resolves once shutdown is signalled. Never resolves if the sender is
/// gone without signalling.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl<S: StateStorage + ?Sized + 'static> Publisher<S> {
    pub fn new(
        engine: Arc<IdentityStateEngine<S>>,
        prover: Arc<dyn ZkGenerator>,
        gateway: Arc<TransactionGateway>,
        events: Arc<dyn EventPublisher>,
        config: PublisherConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            engine,
            prover,
            gateway,
            events,
            config,
            workers,
        }
    }

    pub fn engine(&self) -> &Arc<IdentityStateEngine<S>> {
        &self.engine
    }

    pub fn gateway(&self) -> &Arc<TransactionGateway> {
        &self.gateway
    }

    fn storage(&self) -> &Arc<S> {
        self.engine.storage()
    }

    fn lease_deadline(&self) -> chrono::DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.config.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        Utc::now() + lease
    }

    // =========================================================================
    // ONE IDENTITY
    // =========================================================================

    /// Publish `identifier`'s pending changes, or resume its in-flight state.
    pub async fn publish_state(
        &self,
        identifier: &Did,
        shutdown: &watch::Receiver<bool>,
    ) -> PublishResult<PublicationOutcome> {
        if let Some(in_flight) = self.storage().in_flight_state(identifier)? {
            return self.resume(in_flight, shutdown).await;
        }

        match self.engine.compute_transition(identifier) {
            Ok(TransitionOutcome::NoPendingChanges(_)) => Ok(PublicationOutcome::NothingToPublish),
            Ok(TransitionOutcome::Created(state)) | Ok(TransitionOutcome::Reopened(state)) => {
                self.attempt(state, shutdown).await
            }
            Err(e) if e.is_tree_corruption() => {
                error!(did = %identifier, error = %e, "[id-06] Tree corruption, transition aborted");
                self.events
                    .publish(IssuerEvent::CriticalError {
                        identifier: identifier.clone(),
                        error: e.to_string(),
                    })
                    .await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Take over an in-flight state whose lease has expired or was released.
    async fn resume(
        &self,
        state: IdentityState,
        shutdown: &watch::Receiver<bool>,
    ) -> PublishResult<PublicationOutcome> {
        let leased = self
            .storage()
            .acquire_lease(&state.state_id, self.lease_deadline(), Utc::now())?;
        let Some(state) = leased else {
            debug!(
                did = %state.identifier,
                status = %state.status,
                "[id-06] In-flight state is leased by another worker"
            );
            return Err(PublishError::PublicationInProgress(state.identifier));
        };

        info!(
            did = %state.identifier,
            state = %short_hex(&state.state),
            status = %state.status,
            "[id-06] Resuming in-flight state"
        );
        match state.status {
            StateStatus::Pending => self.attempt(state, shutdown).await,
            StateStatus::Transacted => self.confirm(state, shutdown).await,
            _ => {
                self.release(&state);
                Ok(PublicationOutcome::NothingToPublish)
            }
        }
    }

    /// Prove, submit and confirm a leased `pending` state.
    async fn attempt(
        &self,
        state: IdentityState,
        shutdown: &watch::Receiver<bool>,
    ) -> PublishResult<PublicationOutcome> {
        let identifier = state.identifier.clone();

        // A resubmitted state may still land through its earlier transaction.
        if let Some(previous_tx) = state.tx_hash {
            match self.gateway.transaction_status(&previous_tx).await {
                Ok(TransactionStatus::Confirmed(_)) | Ok(TransactionStatus::Included { .. }) => {
                    info!(did = %identifier, "[id-06] Earlier transaction was mined, confirming it");
                    let mut state = state;
                    state.status = StateStatus::Transacted;
                    state.modified_at = Utc::now();
                    self.storage().update_state(&state)?;
                    return self.confirm(state, shutdown).await;
                }
                Ok(_) => {}
                Err(e) => debug!(did = %identifier, error = %e, "[id-06] Earlier tx status unknown"),
            }
        }

        match self
            .gateway
            .recorded_state(state.identifier.numeric_id(), &state.state)
            .await
        {
            Ok(Some(info)) => return self.adopt_recorded(state, info.created_at_block, shutdown).await,
            Ok(None) => {}
            Err(e) => {
                warn!(did = %identifier, error = %e, "[id-06] Contract state lookup failed");
                self.release(&state);
                return Err(e.into());
            }
        }

        let signed = match self.engine.sign_transition(&state).await {
            Ok(signed) => signed,
            Err(StateEngineError::BrokenChain(reason)) => {
                return self.fail(state, format!("BrokenChain: {reason}")).await;
            }
            Err(e) => {
                self.release(&state);
                return Err(e.into());
            }
        };

        let inputs = StateTransitionInputs::from_signed(&signed);
        let proof = match self
            .until_shutdown(shutdown, self.prover.prove_state_transition(&inputs))
            .await
        {
            Some(Ok(proof)) => proof,
            Some(Err(e)) => {
                error!(
                    did = %identifier,
                    prover = self.prover.name(),
                    error = %e,
                    "[id-06] Proof generation failed, state stays pending"
                );
                self.release(&state);
                return Err(e.into());
            }
            None => {
                self.release(&state);
                return Err(GatewayError::Cancelled.into());
            }
        };

        let key = match self.gateway.publishing_key() {
            Some(key) => Some(key.clone()),
            None => self.engine.identity_eth_key(&identifier).await?,
        };
        let Some(key) = key else {
            self.release(&state);
            return Err(PublishError::NoSigningKey(identifier));
        };

        let call = TransitStateCall::new(
            inputs.user_id,
            signed.old_state,
            signed.new_state,
            signed.is_old_state_genesis,
            &proof,
        );
        let submitted = match self.gateway.submit_transit_state(&key, &call).await {
            Ok(submitted) => submitted,
            Err(e @ GatewayError::GasPriceExceeded { .. }) => {
                self.release(&state);
                return Err(e.into());
            }
            Err(e) => return self.fail(state, e.failure_reason()).await,
        };

        let mut state = state;
        state.status = StateStatus::Transacted;
        state.tx_hash = Some(submitted.tx_hash);
        state.tx_nonce = Some(submitted.nonce);
        state.gas_price = Some(submitted.gas_price);
        state.attempt += 1;
        state.failure_reason = None;
        state.lease_until = Some(self.lease_deadline());
        state.modified_at = Utc::now();
        self.storage().update_state(&state)?;
        self.events
            .publish(IssuerEvent::StateTransacted {
                identifier: identifier.clone(),
                state: state.state,
                tx_hash: submitted.tx_hash,
            })
            .await;

        self.confirm(state, shutdown).await
    }

    /// Wait for a leased `transacted` state's transaction to be final.
    async fn confirm(
        &self,
        state: IdentityState,
        shutdown: &watch::Receiver<bool>,
    ) -> PublishResult<PublicationOutcome> {
        let Some(tx_hash) = state.tx_hash else {
            return self
                .fail(state, "transacted state has no transaction hash".into())
                .await;
        };

        let mut shutdown = shutdown.clone();
        let receipt = match self.gateway.wait_for_confirmation(&tx_hash, &mut shutdown).await {
            Ok(receipt) => receipt,
            Err(GatewayError::Cancelled) => {
                info!(
                    did = %state.identifier,
                    "[id-06] Confirmation wait cancelled, resumable by hash"
                );
                self.release(&state);
                return Err(GatewayError::Cancelled.into());
            }
            Err(e) => {
                // The tracked transaction lost, but another may have recorded the state.
                if let Ok(Some(info)) = self
                    .gateway
                    .recorded_state(state.identifier.numeric_id(), &state.state)
                    .await
                {
                    return self.adopt_recorded(state, info.created_at_block, &shutdown).await;
                }
                return self.fail(state, e.failure_reason()).await;
            }
        };
        self.finalize(state, receipt.block_number).await
    }

    /// Confirm a leased state the contract already recorded in `block_number`.
    async fn adopt_recorded(
        &self,
        mut state: IdentityState,
        block_number: u64,
        shutdown: &watch::Receiver<bool>,
    ) -> PublishResult<PublicationOutcome> {
        info!(
            did = %state.identifier,
            state = %short_hex(&state.state),
            block = block_number,
            "[id-06] State already recorded on chain"
        );
        let mut shutdown = shutdown.clone();
        match self.gateway.wait_for_depth(block_number, &mut shutdown).await {
            Ok(_) => {}
            Err(GatewayError::Cancelled) => {
                self.release(&state);
                return Err(GatewayError::Cancelled.into());
            }
            Err(e) => {
                // Recorded on chain: retry the depth wait rather than fail.
                warn!(did = %state.identifier, error = %e, "[id-06] Recorded state not final yet");
                self.release(&state);
                return Err(e.into());
            }
        }
        // The recording transaction is not known; the tracked one may have reverted.
        state.tx_hash = None;
        state.tx_nonce = None;
        state.gas_price = None;
        self.finalize(state, block_number).await
    }

    async fn finalize(
        &self,
        mut state: IdentityState,
        block_number: u64,
    ) -> PublishResult<PublicationOutcome> {
        state.status = StateStatus::Confirmed;
        state.block_number = Some(block_number);
        state.lease_until = None;
        state.failure_reason = None;
        state.modified_at = Utc::now();
        if let Err(e) = self.storage().update_state(&state) {
            if matches!(e, StorageError::Conflict(_)) {
                error!(did = %state.identifier, error = %e, "[id-06] Confirmed state forks the chain");
                self.events
                    .publish(IssuerEvent::CriticalError {
                        identifier: state.identifier.clone(),
                        error: e.to_string(),
                    })
                    .await;
            }
            return Err(e.into());
        }

        info!(
            did = %state.identifier,
            state = %short_hex(&state.state),
            block = block_number,
            "[id-06] State confirmed"
        );
        self.events
            .publish(IssuerEvent::StateConfirmed {
                identifier: state.identifier.clone(),
                state: state.state,
                block_number,
            })
            .await;
        self.notify_revocation_status(&state).await;
        Ok(PublicationOutcome::Confirmed(state))
    }

    /// Best-effort push of the confirmed revocation root to the sink.
    async fn notify_revocation_status(&self, state: &IdentityState) {
        let delivered = self
            .events
            .publish(IssuerEvent::RevocationRootPublished {
                identifier: state.identifier.clone(),
                state: state.state,
                revocation_tree_root: state.revocation_tree_root,
            })
            .await;
        if delivered == 0 {
            debug!(did = %state.identifier, "[id-06] No revocation-status subscriber");
        }
    }

    async fn fail(
        &self,
        mut state: IdentityState,
        reason: String,
    ) -> PublishResult<PublicationOutcome> {
        warn!(
            did = %state.identifier,
            state = %short_hex(&state.state),
            %reason,
            "[id-06] Publication attempt failed"
        );
        state.status = StateStatus::Failed;
        state.failure_reason = Some(reason.clone());
        state.lease_until = None;
        state.modified_at = Utc::now();
        self.storage().update_state(&state)?;
        self.events
            .publish(IssuerEvent::StateFailed {
                identifier: state.identifier.clone(),
                state: state.state,
                reason,
            })
            .await;
        Ok(PublicationOutcome::Failed(state))
    }

    fn release(&self, state: &IdentityState) {
        if let Err(e) = self.storage().release_lease(&state.state_id) {
            warn!(did = %state.identifier, error = %e, "[id-06] Could not release lease");
        }
    }

    async fn until_shutdown<F: Future>(
        &self,
        shutdown: &watch::Receiver<bool>,
        work: F,
    ) -> Option<F::Output> {
        let mut shutdown = shutdown.clone();
        tokio::select! {
            output = work => Some(output),
            _ = shutdown_signalled(&mut shutdown) => None,
        }
    }

    // =========================================================================
    // ALL IDENTITIES
    // =========================================================================

    /// One publication attempt for every identity with pending work, at
    /// most `max_concurrent` at a time. Transacted states are left to
    /// [`Self::check_transacted_states`].
    pub async fn publish_all(
        self: &Arc<Self>,
        shutdown: &watch::Receiver<bool>,
    ) -> PublishResult<PublishReport> {
        let transacted: HashSet<Did> = self
            .storage()
            .states_with_status(StateStatus::Transacted)?
            .into_iter()
            .map(|s| s.identifier)
            .collect();
        let identities: Vec<Did> = self
            .storage()
            .identities_with_pending_changes()?
            .into_iter()
            .filter(|did| !transacted.contains(did))
            .collect();

        let mut report = PublishReport::default();
        let mut tasks = JoinSet::new();
        for identifier in identities {
            if *shutdown.borrow() {
                break;
            }
            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };
            let publisher = Arc::clone(self);
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = publisher.publish_state(&identifier, &shutdown).await;
                (identifier, result)
            });
        }
        self.collect(tasks, &mut report).await;
        Ok(report)
    }

    /// Resume confirmation polling for `transacted` states whose worker is
    /// gone (lease expired or released).
    pub async fn check_transacted_states(
        self: &Arc<Self>,
        shutdown: &watch::Receiver<bool>,
    ) -> PublishResult<PublishReport> {
        let states = self.storage().states_with_status(StateStatus::Transacted)?;

        let mut report = PublishReport::default();
        let mut tasks = JoinSet::new();
        for state in states {
            if *shutdown.borrow() {
                break;
            }
            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };
            let publisher = Arc::clone(self);
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let identifier = state.identifier.clone();
                let result = publisher.resume(state, &shutdown).await;
                (identifier, result)
            });
        }
        self.collect(tasks, &mut report).await;
        Ok(report)
    }

    async fn collect(
        &self,
        mut tasks: JoinSet<(Did, PublishResult<PublicationOutcome>)>,
        report: &mut PublishReport,
    ) {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((identifier, result)) => {
                    match &result {
                        Err(e) if e.is_caller_error() => {
                            debug!(did = %identifier, error = %e, "[id-06] Skipped")
                        }
                        Err(e) => warn!(did = %identifier, error = %e, "[id-06] Publication error"),
                        Ok(_) => {}
                    }
                    report.record(&result);
                }
                Err(e) => {
                    error!(error = %e, "[id-06] Publication task panicked");
                    report.errors += 1;
                }
            }
        }
    }

    // =========================================================================
    // LOOP
    // =========================================================================

    /// Publish on every tick until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.publish_interval.as_secs(),
            max_concurrent = self.config.max_concurrent,
            prover = self.prover.name(),
            "[id-06] Publisher started"
        );
        let mut ticker = tokio::time::interval(self.config.publish_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.check_transacted_states(&shutdown).await {
                        Ok(report) if report.total() > 0 => {
                            info!(?report, "[id-06] Transacted states checked")
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "[id-06] Transacted check failed"),
                    }
                    match self.publish_all(&shutdown).await {
                        Ok(report) if report.total() > 0 => info!(?report, "[id-06] Publication cycle"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "[id-06] Publication cycle failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("[id-06] Publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use id_01_kms::{KeyManagement, Kms, LocalFileKeyProvider, LocalKeyFile};
    use id_03_identity_state::{EngineConfig, InMemoryStateStore};
    use id_04_proof_generator::{NativeProver, ProofError, ProofResult, ZkProof};
    use id_05_eth_gateway::{GatewayConfig, InMemoryChain};
    use primitive_types::U256;
    use shared_bus::{EventFilter, EventTopic, InMemoryEventBus};
    use shared_crypto::keccak256;
    use shared_types::{Address, KeyType, ZERO_HASH};
    use std::sync::atomic::{AtomicBool, Ordering};

    const CONTRACT: Address = [0xCC; 20];

    /// Native prover that can be switched into failing.
    struct SwitchableProver {
        failing: AtomicBool,
        inner: NativeProver,
    }

    impl SwitchableProver {
        fn failing() -> Self {
            Self {
                failing: AtomicBool::new(true),
                inner: NativeProver::new(),
            }
        }

        fn recover(&self) {
            self.failing.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ZkGenerator for SwitchableProver {
        async fn prove_state_transition(
            &self,
            inputs: &StateTransitionInputs,
        ) -> ProofResult<ZkProof> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProofError::ProofGenerationFailed(
                    "witness calculation failed".into(),
                ));
            }
            self.inner.prove_state_transition(inputs).await
        }

        fn name(&self) -> &'static str {
            "switchable"
        }
    }

    struct Harness {
        publisher: Arc<Publisher<InMemoryStateStore>>,
        chain: Arc<InMemoryChain>,
        bus: Arc<InMemoryEventBus>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn engine(&self) -> &Arc<IdentityStateEngine<InMemoryStateStore>> {
            self.publisher.engine()
        }

        async fn identity(&self) -> (Did, IdentityState) {
            let (identity, genesis) = self
                .engine()
                .create_identity("iden3", "polygon", "amoy")
                .await
                .unwrap();
            (identity.identifier, genesis)
        }

        fn claim(&self, did: &Did, data: &str) {
            self.engine()
                .add_claim(did, keccak256(b"KYCAgeCredential"), data.as_bytes())
                .unwrap();
        }
    }

    fn gateway_config() -> GatewayConfig {
        GatewayConfig {
            contract_address: CONTRACT,
            chain_id: 1337,
            min_gas_price: U256::from(10),
            max_gas_price: U256::from(1_000),
            receipt_timeout: Duration::from_secs(30),
            wait_receipt_cycle_time: Duration::from_secs(1),
            confirmation_timeout: Duration::from_secs(30),
            confirmation_block_count: 2,
            wait_block_cycle_time: Duration::from_secs(1),
            submission_retries: 1,
            retry_backoff: Duration::from_millis(100),
            ..GatewayConfig::default()
        }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(NativeProver::new())).await
    }

    async fn harness_with(prover: Arc<dyn ZkGenerator>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(LocalKeyFile::new(dir.path().join("kms.json")));
        file.create_if_missing().await.unwrap();
        let kms = Kms::builder()
            .register(
                KeyType::BabyJubJub,
                Arc::new(LocalFileKeyProvider::new(KeyType::BabyJubJub, file.clone())),
            )
            .unwrap()
            .register(
                KeyType::Ethereum,
                Arc::new(LocalFileKeyProvider::new(KeyType::Ethereum, file)),
            )
            .unwrap()
            .build();
        let kms: Arc<dyn KeyManagement> = Arc::new(kms);

        let engine = Arc::new(IdentityStateEngine::new(
            Arc::new(InMemoryStateStore::new()),
            kms.clone(),
            EngineConfig::default(),
        ));
        let chain = Arc::new(InMemoryChain::new(1337, CONTRACT));
        chain.set_gas_price(U256::from(100));
        let gateway = Arc::new(TransactionGateway::new(chain.clone(), kms, gateway_config()));
        let bus = Arc::new(InMemoryEventBus::new());
        let publisher = Arc::new(Publisher::new(
            engine,
            prover,
            gateway,
            bus.clone(),
            PublisherConfig {
                max_concurrent: 2,
                publish_interval: Duration::from_secs(5),
                lease_duration: Duration::from_secs(600),
            },
        ));
        Harness {
            publisher,
            chain,
            bus,
            _dir: dir,
        }
    }

    fn running() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_three_claims() {
        let h = harness().await;
        let (did, genesis) = h.identity().await;
        let mut events = h.bus.subscribe(EventFilter::all());
        for data in ["alice", "bob", "carol"] {
            h.claim(&did, data);
        }
        let (_tx, rx) = running();

        let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
        let PublicationOutcome::Confirmed(state) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(state.previous_state, Some(genesis.state));
        assert_eq!(state.revocation_tree_root, genesis.revocation_tree_root);
        assert_eq!(state.revocation_tree_root, ZERO_HASH);
        assert_eq!(state.attempt, 1);
        assert!(state.block_number.is_some());
        assert_eq!(h.chain.state_of(&did.numeric_id()), Some(state.state));

        let current = h.engine().storage().current_state(&did).unwrap().unwrap();
        assert_eq!(current.state_id, state.state_id);
        assert!(h.engine().storage().pending_claims(&did).unwrap().is_empty());

        let mut received = Vec::new();
        while let Some(event) = events.try_recv().unwrap() {
            received.push(event);
        }
        assert_eq!(received.len(), 3);
        assert!(matches!(received[0], IssuerEvent::StateTransacted { .. }));
        assert!(matches!(
            received[1],
            IssuerEvent::StateConfirmed { block_number, .. } if Some(block_number) == state.block_number
        ));
        assert!(matches!(
            received[2],
            IssuerEvent::RevocationRootPublished { revocation_tree_root, .. }
                if revocation_tree_root == ZERO_HASH
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_publish() {
        let h = harness().await;
        let (did, _) = h.identity().await;
        let (_tx, rx) = running();

        let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
        assert_eq!(outcome, PublicationOutcome::NothingToPublish);
        assert_eq!(h.chain.accepted_transactions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leased_state_rejects_second_publication() {
        let h = harness().await;
        let (did, _) = h.identity().await;
        h.claim(&did, "alice");
        // Another worker holds the freshly created pending state.
        assert!(matches!(
            h.engine().compute_transition(&did).unwrap(),
            TransitionOutcome::Created(_)
        ));
        let (_tx, rx) = running();

        let err = h.publisher.publish_state(&did, &rx).await.unwrap_err();
        assert!(matches!(err, PublishError::PublicationInProgress(_)));
        assert!(err.is_caller_error());
        assert_eq!(h.chain.accepted_transactions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_ceiling_leaves_state_pending() {
        let h = harness().await;
        let (did, _) = h.identity().await;
        h.claim(&did, "alice");
        h.chain.set_gas_price(U256::from(5_000));
        let (_tx, rx) = running();

        let err = h.publisher.publish_state(&did, &rx).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Gateway(GatewayError::GasPriceExceeded { .. })
        ));
        assert_eq!(h.chain.accepted_transactions(), 0);
        let pending = h.engine().storage().in_flight_state(&did).unwrap().unwrap();
        assert_eq!(pending.status, StateStatus::Pending);
        assert!(pending.lease_until.is_none());

        h.chain.set_gas_price(U256::from(100));
        let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
        assert!(
            matches!(outcome, PublicationOutcome::Confirmed(ref s) if s.state_id == pending.state_id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_timeout_fails_then_republishes_same_state() {
        let h = harness().await;
        let (did, _) = h.identity().await;
        h.claim(&did, "alice");
        h.chain.set_include_transactions(false);
        let (_tx, rx) = running();

        let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
        let PublicationOutcome::Failed(failed) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(failed.status, StateStatus::Failed);
        assert!(failed
            .failure_reason
            .as_deref()
            .unwrap()
            .starts_with("ConfirmationTimeout"));

        assert_eq!(h.chain.drop_pending_transactions(), 1);
        h.chain.set_include_transactions(true);

        let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
        let PublicationOutcome::Confirmed(confirmed) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(confirmed.state_id, failed.state_id);
        assert_eq!(confirmed.state, failed.state);
        assert_eq!(confirmed.attempt, 2);
        assert_ne!(confirmed.tx_hash, failed.tx_hash);
        assert_eq!(h.chain.state_of(&did.numeric_id()), Some(confirmed.state));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proof_failure_leaves_state_pending() {
        let prover = Arc::new(SwitchableProver::failing());
        let h = harness_with(prover.clone()).await;
        let (did, _) = h.identity().await;
        h.claim(&did, "alice");
        let (_tx, rx) = running();

        let err = h.publisher.publish_state(&did, &rx).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Proof(ProofError::ProofGenerationFailed(_))
        ));
        let pending = h.engine().storage().in_flight_state(&did).unwrap().unwrap();
        assert_eq!(pending.status, StateStatus::Pending);
        assert!(pending.lease_until.is_none());
        assert!(pending.tx_hash.is_none());
        assert_eq!(h.chain.accepted_transactions(), 0);

        prover.recover();
        let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
        let PublicationOutcome::Confirmed(confirmed) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(confirmed.state_id, pending.state_id);
        assert_eq!(h.chain.accepted_transactions(), 1);
        assert_eq!(h.chain.state_of(&did.numeric_id()), Some(confirmed.state));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_first_transaction_confirms_failed_state() {
        let h = harness().await;
        let (did, _) = h.identity().await;
        h.claim(&did, "alice");
        h.chain.set_include_transactions(false);
        let (_tx, rx) = running();

        // Two timed-out attempts leave two transactions stuck in the mempool.
        for _ in 0..2 {
            let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
            assert!(matches!(outcome, PublicationOutcome::Failed(_)));
        }
        assert_eq!(h.chain.accepted_transactions(), 2);

        // The first one mines and records the state; the second reverts.
        h.chain.set_include_transactions(true);
        let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
        let PublicationOutcome::Confirmed(confirmed) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(confirmed.attempt, 2);
        assert!(confirmed.tx_hash.is_none());
        assert_eq!(h.chain.accepted_transactions(), 2);
        assert_eq!(h.chain.state_of(&did.numeric_id()), Some(confirmed.state));
        let current = h.engine().storage().current_state(&did).unwrap().unwrap();
        assert_eq!(current.state_id, confirmed.state_id);

        // Later changes chain onto the recorded state.
        h.claim(&did, "bob");
        let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
        let PublicationOutcome::Confirmed(next) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(next.previous_state, Some(confirmed.state));
        assert_eq!(h.chain.state_of(&did.numeric_id()), Some(next.state));
        assert_eq!(
            h.publisher.publish_state(&did, &rx).await.unwrap(),
            PublicationOutcome::NothingToPublish
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_transacted_state_resumable() {
        let h = harness().await;
        let (did, _) = h.identity().await;
        h.claim(&did, "alice");
        h.chain.set_include_transactions(false);
        let (tx, rx) = running();

        let task = {
            let publisher = h.publisher.clone();
            let did = did.clone();
            tokio::spawn(async move { publisher.publish_state(&did, &rx).await })
        };
        while h.chain.accepted_transactions() == 0 {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        tx.send(true).unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, PublishError::Gateway(GatewayError::Cancelled)));
        let transacted = h.engine().storage().in_flight_state(&did).unwrap().unwrap();
        assert_eq!(transacted.status, StateStatus::Transacted);
        assert!(transacted.lease_until.is_none());

        h.chain.set_include_transactions(true);
        let (_tx, rx) = running();
        let report = h.publisher.check_transacted_states(&rx).await.unwrap();
        assert_eq!(report.confirmed, 1);
        assert_eq!(h.chain.accepted_transactions(), 1);
        assert_eq!(h.chain.state_of(&did.numeric_id()), Some(transacted.state));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_marks_state_failed() {
        let h = harness().await;
        let (did, _) = h.identity().await;
        h.claim(&did, "alice");
        h.chain.revert_next();
        let mut events = h
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Publication]).for_identity(did.clone()));
        let (_tx, rx) = running();

        let outcome = h.publisher.publish_state(&did, &rx).await.unwrap();
        let PublicationOutcome::Failed(state) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(state
            .failure_reason
            .as_deref()
            .unwrap()
            .starts_with("TransactionReverted"));
        let mut failed_events = 0;
        while let Some(event) = events.try_recv().unwrap() {
            if matches!(event, IssuerEvent::StateFailed { .. }) {
                failed_events += 1;
            }
        }
        assert_eq!(failed_events, 1);
        assert_eq!(h.chain.state_of(&did.numeric_id()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_all_covers_every_identity() {
        let h = harness().await;
        let (first, _) = h.identity().await;
        let (second, _) = h.identity().await;
        let (idle, _) = h.identity().await;
        h.claim(&first, "alice");
        h.claim(&second, "bob");
        let (_tx, rx) = running();

        let report = h.publisher.publish_all(&rx).await.unwrap();
        assert_eq!(report.confirmed, 2);
        assert_eq!(report.errors, 0);
        for did in [&first, &second] {
            assert!(h.chain.state_of(&did.numeric_id()).is_some());
        }
        assert!(h.chain.state_of(&idle.numeric_id()).is_none());

        let report = h.publisher.publish_all(&rx).await.unwrap();
        assert_eq!(report.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_until_shutdown() {
        let h = harness().await;
        let (did, genesis) = h.identity().await;
        h.claim(&did, "alice");
        let (tx, rx) = running();

        let handle = tokio::spawn(h.publisher.clone().run(rx));
        for _ in 0..60 {
            let current = h.engine().storage().current_state(&did).unwrap().unwrap();
            if current.state_id != genesis.state_id {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        let current = h.engine().storage().current_state(&did).unwrap().unwrap();
        assert_ne!(current.state_id, genesis.state_id);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
