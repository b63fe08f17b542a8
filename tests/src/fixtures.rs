//! Shared harness for the scenario tests.
//!
//! One [`Fixture`] is one persistence layer plus one chain. Every call to
//! [`Fixture::publisher`] builds an independent replica (own gateway, own
//! worker pool) over that shared state, as separate processes would be.

use id_01_kms::{KeyManagement, Kms, LocalFileKeyProvider, LocalKeyFile};
use id_03_identity_state::{EngineConfig, IdentityStateEngine, InMemoryStateStore, StateStorage};
use id_04_proof_generator::NativeProver;
use id_05_eth_gateway::{GatewayConfig, InMemoryChain, TransactionGateway};
use id_06_publisher::{Publisher, PublisherConfig};
use primitive_types::U256;
use shared_bus::InMemoryEventBus;
use shared_crypto::keccak256;
use shared_types::{Address, Claim, Did, Hash, IdentityState, KeyId, KeyType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const CONTRACT: Address = [0xCC; 20];
pub const CHAIN_ID: u64 = 80002;
pub const CONFIRMATION_BLOCKS: u64 = 3;

pub type Engine = IdentityStateEngine<InMemoryStateStore>;

pub struct Fixture {
    pub engine: Arc<Engine>,
    pub kms: Arc<dyn KeyManagement>,
    pub chain: Arc<InMemoryChain>,
    pub bus: Arc<InMemoryEventBus>,
    _dir: tempfile::TempDir,
}

pub fn gateway_config(publishing_key: Option<KeyId>) -> GatewayConfig {
    GatewayConfig {
        contract_address: CONTRACT,
        chain_id: CHAIN_ID,
        min_gas_price: U256::from(10),
        max_gas_price: U256::from(1_000),
        receipt_timeout: Duration::from_secs(60),
        wait_receipt_cycle_time: Duration::from_secs(2),
        confirmation_timeout: Duration::from_secs(60),
        confirmation_block_count: CONFIRMATION_BLOCKS,
        wait_block_cycle_time: Duration::from_secs(2),
        submission_retries: 2,
        retry_backoff: Duration::from_millis(500),
        publishing_key,
        ..GatewayConfig::default()
    }
}

pub fn publisher_config(max_concurrent: usize) -> PublisherConfig {
    PublisherConfig {
        max_concurrent,
        publish_interval: Duration::from_secs(5),
        lease_duration: Duration::from_secs(600),
    }
}

/// A shutdown channel that is never signalled.
pub fn running() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

pub fn schema() -> Hash {
    keccak256(b"KYCAgeCredential")
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = Arc::new(LocalKeyFile::new(dir.path().join("kms.json")));
        file.create_if_missing().await.expect("key file");
        let kms = Kms::builder()
            .register(
                KeyType::BabyJubJub,
                Arc::new(LocalFileKeyProvider::new(KeyType::BabyJubJub, file.clone())),
            )
            .expect("register BJJ")
            .register(
                KeyType::Ethereum,
                Arc::new(LocalFileKeyProvider::new(KeyType::Ethereum, file)),
            )
            .expect("register ETH")
            .build();
        let kms: Arc<dyn KeyManagement> = Arc::new(kms);

        let engine = Arc::new(IdentityStateEngine::new(
            Arc::new(InMemoryStateStore::new()),
            kms.clone(),
            EngineConfig::default(),
        ));
        let chain = Arc::new(InMemoryChain::new(CHAIN_ID, CONTRACT));
        chain.set_gas_price(U256::from(100));

        Self {
            engine,
            kms,
            chain,
            bus: Arc::new(InMemoryEventBus::new()),
            _dir: dir,
        }
    }

    pub fn gateway(&self, publishing_key: Option<KeyId>) -> Arc<TransactionGateway> {
        Arc::new(TransactionGateway::new(
            self.chain.clone(),
            self.kms.clone(),
            gateway_config(publishing_key),
        ))
    }

    /// A publisher replica signing with each identity's own key.
    pub fn publisher(&self, max_concurrent: usize) -> Arc<Publisher<InMemoryStateStore>> {
        self.publisher_with(self.gateway(None), max_concurrent)
    }

    pub fn publisher_with(
        &self,
        gateway: Arc<TransactionGateway>,
        max_concurrent: usize,
    ) -> Arc<Publisher<InMemoryStateStore>> {
        Arc::new(Publisher::new(
            self.engine.clone(),
            Arc::new(NativeProver::new()),
            gateway,
            self.bus.clone(),
            publisher_config(max_concurrent),
        ))
    }

    pub async fn identity(&self) -> (Did, IdentityState) {
        let (identity, genesis) = self
            .engine
            .create_identity("polygonid", "polygon", "amoy")
            .await
            .expect("create identity");
        (identity.identifier, genesis)
    }

    pub fn claim(&self, did: &Did, data: &str) -> Claim {
        self.engine
            .add_claim(did, schema(), data.as_bytes())
            .expect("add claim")
    }

    pub fn current_state(&self, did: &Did) -> IdentityState {
        self.engine
            .storage()
            .current_state(did)
            .expect("storage")
            .expect("identity has a confirmed state")
    }

    pub fn states(&self, did: &Did) -> Vec<IdentityState> {
        self.engine.storage().states(did).expect("storage")
    }
}
