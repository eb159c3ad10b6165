//! Upload: split, encrypt, commit, store

use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wvault_core::config::{PipelineConfig, WvaultConfig};
use wvault_core::{EncryptionResult, FileRecord, SecurityLevel, VaultError, VaultResult};
use wvault_crypto::encoding::base64_encode;
use wvault_crypto::{
    compute_commitment, encrypt_content, generate_iv, plaintext_digest, seal_critical, ProofPackage,
};
use wvault_keys::KeySessionStore;
use wvault_storage::{ProviderSet, PutReceipt};

use crate::split::SplitPolicy;

pub struct EncryptionPipeline {
    sessions: KeySessionStore,
    content: ProviderSet,
    proofs: ProviderSet,
    split: SplitPolicy,
    inline_critical: bool,
    record_hash: bool,
}

impl EncryptionPipeline {
    pub fn new(sessions: KeySessionStore, content: ProviderSet, config: &PipelineConfig) -> Self {
        Self {
            sessions,
            content,
            proofs: ProviderSet::default(),
            split: SplitPolicy::from_config(config),
            inline_critical: config.inline_critical_bytes,
            record_hash: config.record_content_hash,
        }
    }

    /// Build providers from `[storage]` and pipeline settings from `[pipeline]`.
    pub fn from_config(sessions: KeySessionStore, config: &WvaultConfig) -> VaultResult<Self> {
        config.validate()?;
        let content = ProviderSet::from_configs(&config.storage.content)
            .map_err(|e| VaultError::Config(format!("{e:#}")))?;
        let proofs = ProviderSet::from_configs(&config.storage.proofs)
            .map_err(|e| VaultError::Config(format!("{e:#}")))?;
        Ok(Self::new(sessions, content, &config.pipeline).with_proof_providers(proofs))
    }

    /// Also store a proof package for every upload.
    pub fn with_proof_providers(mut self, proofs: ProviderSet) -> Self {
        self.proofs = proofs;
        self
    }

    pub fn with_split(mut self, split: SplitPolicy) -> Self {
        self.split = split;
        self
    }

    /// Encrypt `data` under the `level` key and store it.
    ///
    /// Succeeds when at least one content provider accepted the ciphertext;
    /// partial failures are listed in the result. Cancellation returns
    /// [`VaultError::Cancelled`] and leaves the session untouched.
    pub async fn upload(
        &self,
        file_name: &str,
        data: &[u8],
        level: SecurityLevel,
        cancel: &CancellationToken,
    ) -> VaultResult<EncryptionResult> {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }
        if self.proofs.is_empty() && !self.inline_critical {
            return Err(VaultError::Config(
                "no proof providers and inline critical bytes disabled".into(),
            ));
        }

        let key = self.sessions.get_key(level).await?;

        let (critical, content) = self.split.split(data);
        let iv = generate_iv();
        let encrypted_content = encrypt_content(&key, &iv, content)
            .map_err(|e| VaultError::Crypto(format!("{e:#}")))?;
        let sealed_critical =
            seal_critical(&key, critical).map_err(|e| VaultError::Crypto(format!("{e:#}")))?;
        let commitment =
            compute_commitment(&sealed_critical, &encrypted_content, key.fingerprint()).to_hex();
        drop(key);

        debug!(
            file = %file_name,
            %level,
            critical = critical.len(),
            content = encrypted_content.len(),
            "encrypted file"
        );

        let receipt = with_cancel(cancel, self.content.put_all(&encrypted_content)).await?;
        let content_locator = match (&receipt.locator, receipt.any_succeeded()) {
            (Some(locator), true) => locator.clone(),
            _ => {
                warn!(file = %file_name, providers = receipt.attempted, "no provider accepted the content");
                return Err(VaultError::UploadFailed {
                    attempted: receipt.attempted,
                    failures: receipt.failures,
                });
            }
        };

        let mut provider_failures = receipt.failures.clone();
        let proof_locator = if self.proofs.is_empty() {
            None
        } else {
            let package = ProofPackage::new(commitment.clone(), &sealed_critical, level, unix_now())
                .map_err(|e| VaultError::Crypto(format!("{e:#}")))?;
            let bytes = package
                .to_bytes()
                .map_err(|e| VaultError::Crypto(format!("{e:#}")))?;
            let proof_receipt = with_cancel(cancel, self.proofs.put_all(&bytes)).await?;
            if !proof_receipt.any_succeeded() && !self.inline_critical {
                return Err(VaultError::UploadFailed {
                    attempted: proof_receipt.attempted,
                    failures: proof_receipt.failures,
                });
            }
            if !proof_receipt.any_succeeded() {
                warn!(file = %file_name, "proof package not stored; record keeps critical bytes inline");
            }
            provider_failures.extend(proof_receipt.failures);
            proof_receipt.locator
        };

        let record = FileRecord {
            content_locator,
            proof_locator,
            encrypted_critical_bytes: self
                .inline_critical
                .then(|| base64_encode(&sealed_critical)),
            file_iv: base64_encode(&iv),
            commitment: commitment.clone(),
            security_level: level,
            file_name: file_name.to_string(),
            content_size: data.len() as u64,
            content_sha256: self.record_hash.then(|| plaintext_digest(data)),
        };

        info!(
            file = %file_name,
            %level,
            bytes = data.len(),
            providers = receipt.successful,
            total = receipt.attempted,
            commitment = %commitment,
            "upload complete"
        );

        Ok(EncryptionResult {
            success: true,
            commitment,
            record,
            successful_providers: receipt.successful,
            total_providers: receipt.attempted,
            provider_failures,
        })
    }
}

async fn with_cancel(
    cancel: &CancellationToken,
    put: impl std::future::Future<Output = PutReceipt>,
) -> VaultResult<PutReceipt> {
    tokio::select! {
        _ = cancel.cancelled() => Err(VaultError::Cancelled),
        receipt = put => Ok(receipt),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
