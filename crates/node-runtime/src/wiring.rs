//! # Subsystem Wiring
//!
//! Builds every subsystem from [`IssuerConfig`] in dependency order:
//!
//! 1. KMS (local key file or vault plugin), one provider per key type
//! 2. State storage and Identity State Engine
//! 3. Ethereum client (JSON-RPC or in-memory dev chain) and gateway
//! 4. Prover (native or remote)
//! 5. Event bus, Publisher and reverse-hash forwarder

use crate::config::{IssuerConfig, KeyStoreProvider};
use crate::rhs::RevocationForwarder;
use id_01_kms::{
    KeyManagement, KeyProvider, Kms, KmsError, LocalFileKeyProvider, LocalKeyFile,
    VaultPluginKeyProvider,
};
use id_03_identity_state::{
    EngineConfig, IdentityStateEngine, InMemoryStateStore, StateEngineError, StateStorage,
};
use id_04_proof_generator::{NativeProver, ProofError, RemoteProver, RemoteProverConfig, ZkGenerator};
use id_05_eth_gateway::{EthClient, GatewayError, InMemoryChain, JsonRpcEthClient, TransactionGateway};
use id_06_publisher::Publisher;
use shared_bus::{EventFilter, EventTopic, InMemoryEventBus};
use shared_crypto::SecretKey;
use shared_types::{Identity, KeyType};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Startup failures.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("Key store: {0}")]
    Kms(#[from] KmsError),

    #[error("Ethereum client: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Prover: {0}")]
    Proof(#[from] ProofError),

    #[error("Identity: {0}")]
    Identity(#[from] StateEngineError),

    #[error("Reverse hash client: {0}")]
    ReverseHash(#[from] reqwest::Error),

    #[error("Chain id mismatch: configured {configured}, endpoint reports {reported}")]
    ChainIdMismatch { configured: u64, reported: u64 },
}

pub type Storage = InMemoryStateStore;

/// The assembled issuer node.
pub struct IssuerNode {
    config: IssuerConfig,
    engine: Arc<IdentityStateEngine<Storage>>,
    publisher: Arc<Publisher<Storage>>,
    bus: Arc<InMemoryEventBus>,
    forwarder: Arc<RevocationForwarder>,
    /// Present when running without an Ethereum endpoint.
    dev_chain: Option<Arc<InMemoryChain>>,
}

impl IssuerNode {
    pub async fn build(config: IssuerConfig) -> Result<Self, NodeError> {
        config.validate()?;

        let kms = build_kms(&config).await?;

        let engine = Arc::new(IdentityStateEngine::new(
            Arc::new(InMemoryStateStore::new()),
            kms.clone(),
            EngineConfig {
                lease_duration: config.publisher.lease_duration,
                ..EngineConfig::default()
            },
        ));

        let (client, dev_chain) = build_eth_client(&config).await?;
        let gateway = Arc::new(TransactionGateway::new(
            client,
            kms,
            config
                .ethereum
                .gateway_config(config.publisher.publishing_key()),
        ));

        let prover: Arc<dyn ZkGenerator> = if config.prover.native {
            Arc::new(NativeProver::new())
        } else {
            Arc::new(RemoteProver::new(RemoteProverConfig {
                server_url: config.prover.server_url.clone(),
                response_timeout: config.prover.response_timeout,
            })?)
        };
        info!(prover = prover.name(), "[node] Prover selected");

        let bus = Arc::new(InMemoryEventBus::new());
        let publisher = Arc::new(Publisher::new(
            engine.clone(),
            prover,
            gateway,
            bus.clone(),
            config.publisher.publisher_config(),
        ));
        let forwarder = Arc::new(RevocationForwarder::new(&config.reverse_hash)?);

        Ok(Self {
            config,
            engine,
            publisher,
            bus,
            forwarder,
            dev_chain,
        })
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<IdentityStateEngine<Storage>> {
        &self.engine
    }

    pub fn publisher(&self) -> &Arc<Publisher<Storage>> {
        &self.publisher
    }

    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    pub fn forwarder(&self) -> &Arc<RevocationForwarder> {
        &self.forwarder
    }

    pub fn dev_chain(&self) -> Option<&Arc<InMemoryChain>> {
        self.dev_chain.as_ref()
    }

    /// Create an identity under the configured DID method and network.
    pub async fn create_identity(&self) -> Result<Identity, NodeError> {
        let id = &self.config.identity;
        let (identity, _) = self
            .engine
            .create_identity(&id.method, &id.blockchain, &id.network)
            .await?;
        Ok(identity)
    }

    /// First identity of the store, creating one if the store is empty.
    pub async fn bootstrap_identity(&self) -> Result<Identity, NodeError> {
        let existing = self
            .engine
            .storage()
            .list_identities()
            .map_err(StateEngineError::from)?;
        match existing.into_iter().next() {
            Some(identity) => Ok(identity),
            None => self.create_identity().await,
        }
    }

    /// Spawn the publication loop and the reverse-hash forwarder.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let events = self.bus.subscribe(EventFilter::topics(vec![
            EventTopic::RevocationStatus,
            EventTopic::DeadLetterQueue,
        ]));
        let forwarder = self.forwarder.clone();
        let forwarder_shutdown = shutdown.clone();
        let forwarding = tokio::spawn(async move { forwarder.run(events, forwarder_shutdown).await });

        let publishing = tokio::spawn(self.publisher.clone().run(shutdown));
        vec![publishing, forwarding]
    }
}

async fn build_kms(config: &IssuerConfig) -> Result<Arc<dyn KeyManagement>, NodeError> {
    let key_types = [KeyType::BabyJubJub, KeyType::Ethereum];
    let mut builder = Kms::builder();

    match config.key_store.provider {
        KeyStoreProvider::Local => {
            let mut file = LocalKeyFile::new(config.key_store.file_path.clone());
            match &config.key_store.file_encryption_key {
                Some(key) => {
                    let bytes = hex::decode(key).map_err(|e| {
                        KmsError::InvalidKeyMaterial(format!("key file encryption key: {e}"))
                    })?;
                    let key = SecretKey::from_slice(&bytes).map_err(KmsError::from)?;
                    file = file.with_encryption(key);
                }
                None => warn!("[node] Key file is not encrypted at rest"),
            }
            file.create_if_missing().await?;
            let file = Arc::new(file);
            for key_type in key_types {
                let provider: Arc<dyn KeyProvider> =
                    Arc::new(LocalFileKeyProvider::new(key_type, file.clone()));
                builder = builder.register(key_type, provider)?;
            }
            info!(path = ?config.key_store.file_path, "[node] Local key store ready");
        }
        KeyStoreProvider::Vault => {
            for key_type in key_types {
                let provider: Arc<dyn KeyProvider> = Arc::new(VaultPluginKeyProvider::new(
                    key_type,
                    config.key_store.vault_config(),
                )?);
                builder = builder.register(key_type, provider)?;
            }
            info!(address = %config.key_store.vault_address, "[node] Vault key store ready");
        }
    }

    Ok(Arc::new(builder.build()))
}

async fn build_eth_client(
    config: &IssuerConfig,
) -> Result<(Arc<dyn EthClient>, Option<Arc<InMemoryChain>>), NodeError> {
    let eth = &config.ethereum;
    let Some(url) = &eth.url else {
        warn!(chain_id = eth.chain_id, "[node] No Ethereum endpoint, using in-memory dev chain");
        let chain = Arc::new(InMemoryChain::new(eth.chain_id, eth.contract_address));
        chain.set_gas_price(eth.min_gas_price);
        return Ok((chain.clone(), Some(chain)));
    };

    let client = JsonRpcEthClient::new(url.clone(), eth.rpc_response_timeout)?;
    let reported = client.chain_id().await?;
    if reported != eth.chain_id {
        return Err(NodeError::ChainIdMismatch {
            configured: eth.chain_id,
            reported,
        });
    }
    info!(%url, chain_id = reported, "[node] Connected to Ethereum endpoint");
    Ok((Arc::new(client), None))
}
