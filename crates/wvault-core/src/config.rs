use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{VaultError, VaultResult};

/// Top-level configuration (loaded from wvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WvaultConfig {
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    pub derivation: DerivationConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of a derived key session in seconds (default: 1 hour)
    pub ttl_secs: u64,
    /// Fixed key under which the reusable credential is persisted
    pub credential_key: String,
    /// Keychain service name for the persisted credential
    pub keychain_service: String,
    /// Capacity of the session event channel
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationConfig {
    /// Key-material endpoint URL
    pub endpoint: String,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Length of the critical prefix split off each file (default: 16)
    pub critical_bytes_len: usize,
    /// Keep encrypted critical bytes in the file record as well as the proof package
    pub inline_critical_bytes: bool,
    /// Treat a commitment mismatch on a Maximum-level file as a hard error
    pub strict_maximum_verification: bool,
    /// Store a SHA-256 of the plaintext in each record (default: false)
    pub record_content_hash: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Providers that receive the encrypted bulk content
    pub content: Vec<ProviderConfig>,
    /// Providers that receive proof packages (optional)
    pub proofs: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    S3,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Name used in logs and failure reports
    pub name: String,
    pub kind: ProviderKind,
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    pub bucket: String,
    /// Object key prefix
    pub prefix: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            credential_key: "session-credential".into(),
            keychain_service: "wvault".into(),
            event_capacity: 64,
        }
    }
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8787/derive-keys".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            critical_bytes_len: 16,
            inline_critical_bytes: true,
            strict_maximum_verification: true,
            record_content_hash: false,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "primary".into(),
            kind: ProviderKind::S3,
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "wvault".into(),
            prefix: "content".into(),
            enforce_tls: false,
        }
    }
}

impl WvaultConfig {
    /// Reject settings the pipelines cannot run with.
    pub fn validate(&self) -> VaultResult<()> {
        if self.session.ttl_secs == 0 {
            return Err(VaultError::Config("session.ttl_secs must be > 0".into()));
        }
        if self.session.event_capacity == 0 {
            return Err(VaultError::Config(
                "session.event_capacity must be > 0".into(),
            ));
        }
        if self.pipeline.critical_bytes_len == 0 {
            return Err(VaultError::Config(
                "pipeline.critical_bytes_len must be > 0".into(),
            ));
        }
        if self.storage.proofs.is_empty() && !self.pipeline.inline_critical_bytes {
            return Err(VaultError::Config(
                "no proof providers configured and inline_critical_bytes is disabled: \
                 uploaded files could never be decrypted"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a TOML file, falling back to defaults when the
/// file does not exist.
pub async fn load_config(path: &Path) -> VaultResult<WvaultConfig> {
    if !path.exists() {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        return Ok(WvaultConfig::default());
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| VaultError::Config(format!("reading config {}: {e}", path.display())))?;
    let config: WvaultConfig = toml::from_str(&content)
        .map_err(|e| VaultError::Config(format!("parsing config {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
