use async_trait::async_trait;
use serde_json::json;

use crate::error::{Result, SecretError};

/// `SetStr`/`GetStr`/`Del` against a key-value store with versioned writes
/// under a fixed mount path (spec §6). Grounded directly on the original
/// Go client (`pkg/vault/vault.go`), which talks to a Vault KV v2 mount; this
/// is the thin HTTP equivalent, since no Vault client crate exists anywhere
/// in the example corpus.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn set_str(&self, key: &str, value: &str) -> Result<()>;
    async fn get_str(&self, key: &str) -> Result<String>;
    /// Deletes the key, purging all versions (spec §6).
    async fn del(&self, key: &str) -> Result<()>;
}

/// HTTP client for a Vault-compatible KV v2 secret engine.
pub struct VaultSecretStore {
    http: reqwest::Client,
    address: String,
    token: String,
    mount: String,
}

impl VaultSecretStore {
    /// `mount` defaults to `"secret"`, matching the original client's fixed
    /// mount path.
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_mount(address, token, "secret")
    }

    pub fn with_mount(
        address: impl Into<String>,
        token: impl Into<String>,
        mount: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            address: address.into(),
            token: token.into(),
            mount: mount.into(),
        }
    }

    fn data_url(&self, key: &str) -> String {
        format!("{}/v1/{}/data/{}", self.address, self.mount, key)
    }

    fn metadata_url(&self, key: &str) -> String {
        format!("{}/v1/{}/metadata/{}", self.address, self.mount, key)
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn set_str(&self, key: &str, value: &str) -> Result<()> {
        let resp = self
            .http
            .put(self.data_url(key))
            .header("X-Vault-Token", &self.token)
            .json(&json!({ "data": { "value": value } }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SecretError::Status { status, body });
        }
        Ok(())
    }

    async fn get_str(&self, key: &str) -> Result<String> {
        let resp = self
            .http
            .get(self.data_url(key))
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SecretError::NotFound(key.to_string()));
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SecretError::Status { status, body });
        }
        let body: serde_json::Value = resp.json().await?;
        body.get("data")
            .and_then(|d| d.get("data"))
            .and_then(|d| d.get("value"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| SecretError::Malformed(format!("no data.data.value in response for {key}")))
    }

    async fn del(&self, key: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.metadata_url(key))
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SecretError::Status { status, body });
        }
        Ok(())
    }
}
