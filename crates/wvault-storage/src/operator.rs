//! OpenDAL-backed storage providers

use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::Operator;
use tracing::debug;

use wvault_core::config::{ProviderConfig, ProviderKind};

use crate::provider::StorageProvider;

/// A content-addressed provider on top of an OpenDAL operator.
///
/// Objects are stored at `{prefix}/{blake3(bytes)}`; the hash is the
/// locator, so identical payloads share one object.
pub struct OpendalProvider {
    name: String,
    op: Operator,
    prefix: String,
}

impl OpendalProvider {
    pub fn new(name: impl Into<String>, op: Operator, prefix: &str) -> Self {
        Self {
            name: name.into(),
            op,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// An in-process provider backed by OpenDAL's memory service.
    pub fn memory(name: impl Into<String>) -> Result<Self> {
        let op = Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish();
        Ok(Self::new(name, op, "objects"))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Object path for a locator.
    pub fn object_path(&self, locator: &str) -> String {
        if self.prefix.is_empty() {
            locator.to_string()
        } else {
            format!("{}/{locator}", self.prefix)
        }
    }
}

#[async_trait]
impl StorageProvider for OpendalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, bytes: Vec<u8>) -> Result<String> {
        let locator = blake3::hash(&bytes).to_hex().to_string();
        let path = self.object_path(&locator);
        let len = bytes.len();

        if self.op.exists(&path).await.unwrap_or(false) {
            debug!(provider = %self.name, locator = %locator, "dedup: object already stored");
            return Ok(locator);
        }

        self.op
            .write(&path, bytes)
            .await
            .with_context(|| format!("writing {path} to {}", self.name))?;
        debug!(provider = %self.name, locator = %locator, bytes = len, "stored object");
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.object_path(locator);
        let data = self
            .op
            .read(&path)
            .await
            .with_context(|| format!("reading {path} from {}", self.name))?;
        Ok(data.to_vec())
    }

    async fn check(&self) -> Result<()> {
        crate::health::check_health(&self.op).await
    }
}

/// Build an OpenDAL Operator for an S3-compatible endpoint
///
/// Uses path-style addressing (default in opendal 0.55), which Filebase,
/// SeaweedFS and MinIO all accept.
pub fn build_operator(
    cfg: &ProviderConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            anyhow::bail!(
                "provider '{}' uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set enforce_tls = false for local development.",
                cfg.name,
                cfg.endpoint
            );
        }
        tracing::warn!(
            provider = %cfg.name,
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP: credentials are transmitted unencrypted"
        );
    }

    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key);

    let op = Operator::new(builder)
        .with_context(|| format!("creating OpenDAL S3 operator for '{}'", cfg.name))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build a provider from config.
///
/// S3 credentials come from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
pub fn build_provider(cfg: &ProviderConfig) -> Result<OpendalProvider> {
    match cfg.kind {
        ProviderKind::Memory => {
            let op = Operator::new(opendal::services::Memory::default())
                .context("creating OpenDAL memory operator")?
                .finish();
            Ok(OpendalProvider::new(&cfg.name, op, &cfg.prefix))
        }
        ProviderKind::S3 => {
            let access_key = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
            let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
            let op = build_operator(cfg, &access_key, &secret_key)?;
            Ok(OpendalProvider::new(&cfg.name, op, &cfg.prefix))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3_config(endpoint: &str, enforce_tls: bool) -> ProviderConfig {
        ProviderConfig {
            name: "test".into(),
            kind: ProviderKind::S3,
            endpoint: endpoint.into(),
            enforce_tls,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_operator_http_warning() {
        let result = build_operator(&s3_config("http://localhost:8333", false), "key", "secret");
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_operator_http_enforce_tls() {
        let result = build_operator(&s3_config("http://insecure:8333", true), "key", "secret");
        assert!(result.is_err(), "HTTP + enforce_tls must fail");
        assert!(result.unwrap_err().to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_build_operator_https() {
        let result = build_operator(&s3_config("https://s3.example.com", true), "key", "secret");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_memory_put_get() {
        let provider = OpendalProvider::memory("mem").unwrap();
        let locator = provider.put(b"ciphertext".to_vec()).await.unwrap();

        assert_eq!(locator, blake3::hash(b"ciphertext").to_hex().to_string());
        assert_eq!(provider.get(&locator).await.unwrap(), b"ciphertext");
        assert!(provider
            .operator()
            .exists(&provider.object_path(&locator))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_locator_fails() {
        let provider = OpendalProvider::memory("mem").unwrap();
        let err = provider.get("deadbeef").await.unwrap_err();
        assert!(err.to_string().contains("mem"));
    }

    #[tokio::test]
    async fn test_build_memory_provider_from_config() {
        let cfg = ProviderConfig {
            name: "scratch".into(),
            kind: ProviderKind::Memory,
            prefix: "proofs/".into(),
            ..Default::default()
        };
        let provider = build_provider(&cfg).unwrap();
        assert_eq!(provider.name(), "scratch");
        assert_eq!(provider.object_path("abc"), "proofs/abc");
    }
}
