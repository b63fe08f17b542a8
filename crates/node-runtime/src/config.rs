//! # Issuer Configuration
//!
//! Typed configuration for every subsystem, built from defaults overridden
//! by `ISSUER_*` environment variables.
//!
//! | Variable | Section |
//! |----------|---------|
//! | `ISSUER_ETHEREUM_*` | [`EthereumConfig`] |
//! | `ISSUER_PROVER_*` | [`ProverConfig`] |
//! | `ISSUER_KEYSTORE_*` | [`KeyStoreConfig`] |
//! | `ISSUER_PUBLISHER_*` | [`PublisherSettings`] |
//! | `ISSUER_IDENTITY_*` | [`IdentityConfig`] |
//! | `ISSUER_RHS_*` | [`ReverseHashConfig`] |
//! | `ISSUER_LOG_*` | [`LogConfig`] |
//!
//! Durations are whole seconds.

use id_01_kms::VaultConfig;
use id_05_eth_gateway::GatewayConfig;
use id_06_publisher::PublisherConfig;
use primitive_types::U256;
use shared_types::{Address, KeyId, KeyType};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}'")]
    Invalid { var: String, value: String },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Complete issuer node configuration.
#[derive(Debug, Clone, Default)]
pub struct IssuerConfig {
    pub ethereum: EthereumConfig,
    pub prover: ProverConfig,
    pub key_store: KeyStoreConfig,
    pub publisher: PublisherSettings,
    pub identity: IdentityConfig,
    pub reverse_hash: ReverseHashConfig,
    pub log: LogConfig,
}

/// Blockchain endpoint and gateway policy.
#[derive(Debug, Clone)]
pub struct EthereumConfig {
    /// JSON-RPC endpoint. `None` runs against the in-memory dev chain.
    pub url: Option<String>,
    pub contract_address: Address,
    pub chain_id: u64,
    pub default_gas_limit: u64,
    pub min_gas_price: U256,
    pub max_gas_price: U256,
    pub rpc_response_timeout: Duration,
    pub receipt_timeout: Duration,
    pub wait_receipt_cycle_time: Duration,
    pub confirmation_timeout: Duration,
    pub confirmation_block_count: u64,
    pub wait_block_cycle_time: Duration,
    pub submission_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for EthereumConfig {
    fn default() -> Self {
        let gateway = GatewayConfig::default();
        Self {
            url: None,
            contract_address: gateway.contract_address,
            chain_id: gateway.chain_id,
            default_gas_limit: gateway.default_gas_limit,
            min_gas_price: gateway.min_gas_price,
            max_gas_price: gateway.max_gas_price,
            rpc_response_timeout: Duration::from_secs(10),
            receipt_timeout: gateway.receipt_timeout,
            wait_receipt_cycle_time: gateway.wait_receipt_cycle_time,
            confirmation_timeout: gateway.confirmation_timeout,
            confirmation_block_count: gateway.confirmation_block_count,
            wait_block_cycle_time: gateway.wait_block_cycle_time,
            submission_retries: gateway.submission_retries,
            retry_backoff: gateway.retry_backoff,
        }
    }
}

impl EthereumConfig {
    pub fn gateway_config(&self, publishing_key: Option<KeyId>) -> GatewayConfig {
        GatewayConfig {
            contract_address: self.contract_address,
            chain_id: self.chain_id,
            default_gas_limit: self.default_gas_limit,
            min_gas_price: self.min_gas_price,
            max_gas_price: self.max_gas_price,
            receipt_timeout: self.receipt_timeout,
            wait_receipt_cycle_time: self.wait_receipt_cycle_time,
            confirmation_timeout: self.confirmation_timeout,
            confirmation_block_count: self.confirmation_block_count,
            wait_block_cycle_time: self.wait_block_cycle_time,
            submission_retries: self.submission_retries,
            retry_backoff: self.retry_backoff,
            publishing_key,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProverConfig {
    /// Prove in-process instead of calling the prover server.
    pub native: bool,
    pub server_url: String,
    pub response_timeout: Duration,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            native: true,
            server_url: "http://localhost:8002".to_string(),
            response_timeout: Duration::from_secs(300),
        }
    }
}

/// Signing backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStoreProvider {
    Local,
    Vault,
}

impl FromStr for KeyStoreProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "localstorage" => Ok(Self::Local),
            "vault" => Ok(Self::Vault),
            other => Err(format!("unknown key store provider: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyStoreConfig {
    pub provider: KeyStoreProvider,
    pub file_path: PathBuf,
    /// Hex-encoded 32-byte key encrypting private keys at rest.
    pub file_encryption_key: Option<String>,
    pub vault_address: String,
    pub vault_token: Option<String>,
    pub vault_mount_path: String,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        let vault = VaultConfig::default();
        Self {
            provider: KeyStoreProvider::Local,
            file_path: PathBuf::from("./data/kms_localstorage_keys.json"),
            file_encryption_key: None,
            vault_address: vault.address,
            vault_token: None,
            vault_mount_path: vault.mount_path,
        }
    }
}

impl KeyStoreConfig {
    pub fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            address: self.vault_address.clone(),
            token: self.vault_token.clone().unwrap_or_default(),
            mount_path: self.vault_mount_path.clone(),
            ..VaultConfig::default()
        }
    }
}

/// Publication loop settings.
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    /// Key path of a shared Ethereum publishing key.
    pub publishing_key_path: Option<String>,
    pub publish_interval: Duration,
    pub max_concurrent: usize,
    pub lease_duration: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        let publisher = PublisherConfig::default();
        Self {
            publishing_key_path: None,
            publish_interval: publisher.publish_interval,
            max_concurrent: publisher.max_concurrent,
            lease_duration: publisher.lease_duration,
        }
    }
}

impl PublisherSettings {
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            max_concurrent: self.max_concurrent,
            publish_interval: self.publish_interval,
            lease_duration: self.lease_duration,
        }
    }

    pub fn publishing_key(&self) -> Option<KeyId> {
        self.publishing_key_path
            .as_ref()
            .map(|path| KeyId::new(KeyType::Ethereum, path.clone()))
    }
}

/// DID components for identities created by this node.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub method: String,
    pub blockchain: String,
    pub network: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            method: "polygonid".to_string(),
            blockchain: "polygon".to_string(),
            network: "amoy".to_string(),
        }
    }
}

/// Reverse Hash Service notification target.
#[derive(Debug, Clone)]
pub struct ReverseHashConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub request_timeout: Duration,
}

impl Default for ReverseHashConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

struct Overrides<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Overrides<F> {
    fn string(&self, var: &str, target: &mut String) {
        if let Some(value) = (self.lookup)(var) {
            *target = value;
        }
    }

    fn optional(&self, var: &str, target: &mut Option<String>) {
        if let Some(value) = (self.lookup)(var) {
            *target = (!value.is_empty()).then_some(value);
        }
    }

    fn parse<T: FromStr>(&self, var: &str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(value) = (self.lookup)(var) {
            *target = value.trim().parse().map_err(|_| ConfigError::Invalid {
                var: var.to_string(),
                value,
            })?;
        }
        Ok(())
    }

    fn seconds(&self, var: &str, target: &mut Duration) -> Result<(), ConfigError> {
        let mut secs = target.as_secs();
        self.parse(var, &mut secs)?;
        *target = Duration::from_secs(secs);
        Ok(())
    }

    fn u256(&self, var: &str, target: &mut U256) -> Result<(), ConfigError> {
        if let Some(value) = (self.lookup)(var) {
            *target = U256::from_dec_str(value.trim()).map_err(|_| ConfigError::Invalid {
                var: var.to_string(),
                value,
            })?;
        }
        Ok(())
    }

    fn address(&self, var: &str, target: &mut Address) -> Result<(), ConfigError> {
        if let Some(value) = (self.lookup)(var) {
            let invalid = || ConfigError::Invalid {
                var: var.to_string(),
                value: value.clone(),
            };
            let bytes = hex::decode(value.trim().trim_start_matches("0x")).map_err(|_| invalid())?;
            *target = bytes.try_into().map_err(|_| invalid())?;
        }
        Ok(())
    }
}

impl IssuerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by `lookup(var)` for each known variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Overrides { lookup };
        let mut config = Self::default();

        let eth = &mut config.ethereum;
        env.optional("ISSUER_ETHEREUM_URL", &mut eth.url);
        env.address("ISSUER_ETHEREUM_CONTRACT_ADDRESS", &mut eth.contract_address)?;
        env.parse("ISSUER_ETHEREUM_CHAIN_ID", &mut eth.chain_id)?;
        env.parse("ISSUER_ETHEREUM_DEFAULT_GAS_LIMIT", &mut eth.default_gas_limit)?;
        env.u256("ISSUER_ETHEREUM_MIN_GAS_PRICE", &mut eth.min_gas_price)?;
        env.u256("ISSUER_ETHEREUM_MAX_GAS_PRICE", &mut eth.max_gas_price)?;
        env.seconds("ISSUER_ETHEREUM_RPC_RESPONSE_TIMEOUT", &mut eth.rpc_response_timeout)?;
        env.seconds("ISSUER_ETHEREUM_RECEIPT_TIMEOUT", &mut eth.receipt_timeout)?;
        env.seconds("ISSUER_ETHEREUM_WAIT_RECEIPT_CYCLE_TIME", &mut eth.wait_receipt_cycle_time)?;
        env.seconds("ISSUER_ETHEREUM_CONFIRMATION_TIMEOUT", &mut eth.confirmation_timeout)?;
        env.parse("ISSUER_ETHEREUM_CONFIRMATION_BLOCK_COUNT", &mut eth.confirmation_block_count)?;
        env.seconds("ISSUER_ETHEREUM_WAIT_BLOCK_CYCLE_TIME", &mut eth.wait_block_cycle_time)?;
        env.parse("ISSUER_ETHEREUM_SUBMISSION_RETRIES", &mut eth.submission_retries)?;
        env.seconds("ISSUER_ETHEREUM_RETRY_BACKOFF", &mut eth.retry_backoff)?;

        let prover = &mut config.prover;
        env.parse("ISSUER_PROVER_NATIVE", &mut prover.native)?;
        env.string("ISSUER_PROVER_SERVER_URL", &mut prover.server_url);
        env.seconds("ISSUER_PROVER_TIMEOUT", &mut prover.response_timeout)?;

        let keys = &mut config.key_store;
        env.parse("ISSUER_KEYSTORE_PROVIDER", &mut keys.provider)?;
        if let Some(path) = (env.lookup)("ISSUER_KEYSTORE_FILE_PATH") {
            keys.file_path = PathBuf::from(path);
        }
        env.optional("ISSUER_KEYSTORE_ENCRYPTION_KEY", &mut keys.file_encryption_key);
        env.string("ISSUER_KEYSTORE_VAULT_ADDRESS", &mut keys.vault_address);
        env.optional("ISSUER_KEYSTORE_VAULT_TOKEN", &mut keys.vault_token);
        env.string("ISSUER_KEYSTORE_VAULT_MOUNT_PATH", &mut keys.vault_mount_path);

        let publisher = &mut config.publisher;
        env.optional("ISSUER_PUBLISHER_KEY_PATH", &mut publisher.publishing_key_path);
        env.seconds("ISSUER_PUBLISHER_INTERVAL", &mut publisher.publish_interval)?;
        env.parse("ISSUER_PUBLISHER_MAX_CONCURRENT", &mut publisher.max_concurrent)?;
        env.seconds("ISSUER_PUBLISHER_LEASE_DURATION", &mut publisher.lease_duration)?;

        let identity = &mut config.identity;
        env.string("ISSUER_IDENTITY_METHOD", &mut identity.method);
        env.string("ISSUER_IDENTITY_BLOCKCHAIN", &mut identity.blockchain);
        env.string("ISSUER_IDENTITY_NETWORK", &mut identity.network);

        let rhs = &mut config.reverse_hash;
        env.parse("ISSUER_RHS_ENABLED", &mut rhs.enabled)?;
        env.optional("ISSUER_RHS_URL", &mut rhs.url);

        env.string("ISSUER_LOG_LEVEL", &mut config.log.level);
        env.parse("ISSUER_LOG_FORMAT", &mut config.log.format)?;

        Ok(config)
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let eth = &self.ethereum;
        if eth.min_gas_price > eth.max_gas_price {
            return Err(ConfigError::Inconsistent(format!(
                "min gas price {} exceeds max gas price {}",
                eth.min_gas_price, eth.max_gas_price
            )));
        }
        if eth.receipt_timeout.is_zero() || eth.confirmation_timeout.is_zero() {
            return Err(ConfigError::Inconsistent(
                "receipt and confirmation timeouts must be non-zero".into(),
            ));
        }
        if eth.wait_receipt_cycle_time.is_zero() || eth.wait_block_cycle_time.is_zero() {
            return Err(ConfigError::Inconsistent("poll cycle times must be non-zero".into()));
        }
        if self.publisher.max_concurrent == 0 {
            return Err(ConfigError::Inconsistent(
                "max concurrent publications must be at least 1".into(),
            ));
        }
        if self.publisher.publish_interval.is_zero() {
            return Err(ConfigError::Inconsistent("publish interval must be non-zero".into()));
        }
        let wait = eth.receipt_timeout + eth.confirmation_timeout;
        if self.publisher.lease_duration <= wait {
            return Err(ConfigError::Inconsistent(format!(
                "lease duration {:?} must outlast the confirmation wait {:?}",
                self.publisher.lease_duration, wait
            )));
        }
        if self.key_store.provider == KeyStoreProvider::Vault
            && self.key_store.vault_token.is_none()
        {
            return Err(ConfigError::Inconsistent(
                "vault key store selected without ISSUER_KEYSTORE_VAULT_TOKEN".into(),
            ));
        }
        if let Some(key) = &self.key_store.file_encryption_key {
            if hex::decode(key).map(|bytes| bytes.len()) != Ok(32) {
                return Err(ConfigError::Inconsistent(
                    "key file encryption key must be 32 hex-encoded bytes".into(),
                ));
            }
        }
        if !self.prover.native && self.prover.server_url.is_empty() {
            return Err(ConfigError::Inconsistent(
                "remote prover selected without a server url".into(),
            ));
        }
        if self.reverse_hash.enabled && self.reverse_hash.url.is_none() {
            return Err(ConfigError::Inconsistent(
                "reverse hash service enabled without ISSUER_RHS_URL".into(),
            ));
        }
        Ok(())
    }
}
