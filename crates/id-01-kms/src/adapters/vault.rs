//! # Vault Plugin Key Provider
//!
//! Keys held by a remote secrets engine exposing the iden3 key plugin over
//! HTTP. Key material never leaves the vault: the provider only forwards
//! create/sign/list/move requests authenticated with `X-Vault-Token`.
//!
//! ```text
//! POST {addr}/v1/{mount}/new          {"key_type", "path"}   -> {"data": {"public_key"}}
//! GET  {addr}/v1/{mount}/keys/{path}                         -> {"data": {"public_key"}}
//! POST {addr}/v1/{mount}/sign/{path}  {"data": hex}          -> {"data": {"signature"}}
//! LIST {addr}/v1/{mount}/keys/{did}                          -> {"data": {"keys": [...]}}
//! POST {addr}/v1/{mount}/move/{path}  {"dest"}               -> {}
//! ```

use crate::domain::{KmsError, KmsResult};
use crate::ports::KeyProvider;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_types::{Did, KeyId, KeyType};
use std::time::Duration;
use tracing::{debug, warn};

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Connection settings for the vault plugin.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub address: String,
    pub token: String,
    pub mount_path: String,
    pub request_timeout: Duration,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: String::new(),
            mount_path: "iden3".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct NewKeyRequest<'a> {
    key_type: &'a str,
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct SignRequest {
    data: String,
}

#[derive(Debug, Serialize)]
struct MoveRequest<'a> {
    dest: &'a str,
}

#[derive(Debug, Deserialize)]
struct VaultResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PublicKeyData {
    public_key: String,
}

#[derive(Debug, Deserialize)]
struct SignatureData {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

/// Key type name understood by the plugin.
fn plugin_key_type(key_type: KeyType) -> &'static str {
    match key_type {
        KeyType::Ethereum => "ethereum",
        KeyType::BabyJubJub => "babyjubjub",
    }
}

fn decode_hex(value: &str) -> KmsResult<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| KmsError::Backend(format!("malformed hex in vault response: {e}")))
}

/// Provider for one key type backed by the vault plugin.
pub struct VaultPluginKeyProvider {
    key_type: KeyType,
    config: VaultConfig,
    client: reqwest::Client,
}

impl VaultPluginKeyProvider {
    pub fn new(key_type: KeyType, config: VaultConfig) -> KmsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| KmsError::Backend(e.to_string()))?;
        Ok(Self {
            key_type,
            config,
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/v1/{}/{}",
            self.config.address.trim_end_matches('/'),
            self.config.mount_path.trim_matches('/'),
            endpoint
        )
    }

    /// Path of a fresh key: `<did>/<TYPE>:<random>` or `<TYPE>:<random>`.
    fn fresh_path(&self, owner: Option<&Did>) -> String {
        let leaf = format!("{}:{}", self.key_type, random_suffix());
        match owner {
            Some(did) => format!("{did}/{leaf}"),
            None => leaf,
        }
    }

    async fn call<B, T>(&self, method: Method, endpoint: &str, body: Option<&B>) -> KmsResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.url(endpoint);
        let mut request = self
            .client
            .request(method, &url)
            .header(TOKEN_HEADER, &self.config.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| KmsError::Backend(format!("{url}: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(KmsError::KeyNotFound(endpoint.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "[id-01] Vault request failed: {}", body);
            return Err(KmsError::Backend(format!("HTTP {status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| KmsError::Backend(format!("unexpected vault response: {e}")))
    }

    fn check_type(&self, key: &KeyId) -> KmsResult<()> {
        if key.key_type != self.key_type {
            return Err(KmsError::NoProvider(key.key_type));
        }
        Ok(())
    }
}

/// Random hex suffix for vault key paths.
fn random_suffix() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

#[async_trait]
impl KeyProvider for VaultPluginKeyProvider {
    fn key_type(&self) -> KeyType {
        self.key_type
    }

    async fn new_key(&self, owner: Option<&Did>) -> KmsResult<KeyId> {
        let path = self.fresh_path(owner);
        let request = NewKeyRequest {
            key_type: plugin_key_type(self.key_type),
            path: &path,
        };
        let _: VaultResponse<PublicKeyData> =
            self.call(Method::POST, "new", Some(&request)).await?;
        debug!(key_path = %path, "[id-01] Created key in vault");
        Ok(KeyId::new(self.key_type, path))
    }

    async fn link_to_identity(&self, key: &KeyId, owner: &Did) -> KmsResult<KeyId> {
        self.check_type(key)?;
        if key.id.contains('/') {
            return Err(KmsError::AlreadyLinked(key.id.clone()));
        }
        let dest = format!("{owner}/{}", key.id);
        let _: serde_json::Value = self
            .call(
                Method::POST,
                &format!("move/{}", key.id),
                Some(&MoveRequest { dest: &dest }),
            )
            .await?;
        Ok(KeyId::new(self.key_type, dest))
    }

    async fn public_key(&self, key: &KeyId) -> KmsResult<Vec<u8>> {
        self.check_type(key)?;
        let resp: VaultResponse<PublicKeyData> = self
            .call::<(), _>(Method::GET, &format!("keys/{}", key.id), None)
            .await?;
        decode_hex(&resp.data.public_key)
    }

    async fn sign(&self, key: &KeyId, payload: &[u8]) -> KmsResult<Vec<u8>> {
        self.check_type(key)?;
        let request = SignRequest {
            data: hex::encode(payload),
        };
        let resp: VaultResponse<SignatureData> = self
            .call(Method::POST, &format!("sign/{}", key.id), Some(&request))
            .await?;
        decode_hex(&resp.data.signature)
    }

    async fn keys_by_identity(&self, owner: &Did) -> KmsResult<Vec<KeyId>> {
        let list = Method::from_bytes(b"LIST").map_err(|e| KmsError::Backend(e.to_string()))?;
        let resp: KmsResult<VaultResponse<ListData>> = self
            .call::<(), _>(list, &format!("keys/{owner}"), None)
            .await;
        let keys = match resp {
            Ok(resp) => resp.data.keys,
            Err(KmsError::KeyNotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let prefix = format!("{}:", self.key_type);
        Ok(keys
            .into_iter()
            .filter(|leaf| leaf.starts_with(&prefix))
            .map(|leaf| KeyId::new(self.key_type, format!("{owner}/{leaf}")))
            .collect())
    }
}
