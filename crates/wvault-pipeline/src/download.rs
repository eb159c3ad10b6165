//! Download: validate, fetch, verify, decrypt

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wvault_core::config::{PipelineConfig, WvaultConfig};
use wvault_core::{DecryptionResult, FileRecord, SecurityLevel, VaultError, VaultResult};
use wvault_crypto::commitment::verify_commitment_hex;
use wvault_crypto::encoding::{base64_decode, decode_iv};
use wvault_crypto::{
    compute_commitment, decrypt_content, open_critical, verify_plaintext_digest, ProofPackage,
};
use wvault_keys::KeySessionStore;
use wvault_storage::ProviderSet;

use crate::split::SplitPolicy;

pub struct DecryptionPipeline {
    sessions: KeySessionStore,
    content: ProviderSet,
    proofs: ProviderSet,
    split: SplitPolicy,
    strict_maximum: bool,
}

impl DecryptionPipeline {
    pub fn new(sessions: KeySessionStore, content: ProviderSet, config: &PipelineConfig) -> Self {
        Self {
            sessions,
            content,
            proofs: ProviderSet::default(),
            split: SplitPolicy::from_config(config),
            strict_maximum: config.strict_maximum_verification,
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

    pub fn with_proof_providers(mut self, proofs: ProviderSet) -> Self {
        self.proofs = proofs;
        self
    }

    /// Recover the plaintext described by `record`.
    ///
    /// A commitment mismatch is reported through `commitment_valid` and
    /// `verified`; only `Maximum` records under strict verification turn it
    /// into [`VaultError::CommitmentMismatch`]. AEAD failure is always an
    /// error.
    pub async fn download(
        &self,
        record: &FileRecord,
        cancel: &CancellationToken,
    ) -> VaultResult<DecryptionResult> {
        record.validate_for_download()?;
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }

        let level = record.security_level;
        let key = self.sessions.get_key(level).await?;
        let iv = decode_iv(&record.file_iv).map_err(|e| VaultError::Crypto(format!("{e:#}")))?;

        let encrypted_content = tokio::select! {
            _ = cancel.cancelled() => return Err(VaultError::Cancelled),
            r = self.content.get_first(&record.content_locator) => {
                r.map_err(|e| VaultError::Storage(format!("{e:#}")))?
            }
        };
        let sealed_critical = tokio::select! {
            _ = cancel.cancelled() => return Err(VaultError::Cancelled),
            r = self.critical_bytes(record) => r?,
        };

        let recomputed =
            compute_commitment(&sealed_critical, &encrypted_content, key.fingerprint()).to_hex();
        let commitment_valid = verify_commitment_hex(
            &record.commitment,
            &sealed_critical,
            &encrypted_content,
            key.fingerprint(),
        );
        if !commitment_valid {
            warn!(
                file = %record.file_name,
                %level,
                locator = %record.content_locator,
                "commitment mismatch: stored content may have been tampered with"
            );
        }

        let critical = open_critical(&key, &sealed_critical)
            .map_err(|_| VaultError::DecryptionFailed { commitment_valid })?;
        let content = decrypt_content(&key, &iv, &encrypted_content)
            .map_err(|_| VaultError::DecryptionFailed { commitment_valid })?;
        drop(key);

        if !commitment_valid && self.strict_maximum && level == SecurityLevel::Maximum {
            return Err(VaultError::CommitmentMismatch);
        }

        let data = self.split.join(&critical, &content);
        if let Some(expected) = record.content_sha256.as_deref().filter(|h| !h.is_empty()) {
            if !verify_plaintext_digest(expected, &data) {
                warn!(file = %record.file_name, %level, "decrypted content does not match recorded hash");
                return Err(VaultError::ContentHashMismatch);
            }
        }
        info!(
            file = %record.file_name,
            %level,
            bytes = data.len(),
            verified = commitment_valid,
            "download complete"
        );

        Ok(DecryptionResult {
            success: true,
            data,
            file_name: record.file_name.clone(),
            security_level: level,
            commitment: recomputed,
            commitment_valid,
            verified: commitment_valid,
        })
    }

    /// Sealed critical bytes: inline when present, else from the proof package.
    async fn critical_bytes(&self, record: &FileRecord) -> VaultResult<Vec<u8>> {
        if let Some(inline) = record.encrypted_critical_bytes.as_deref().filter(|b| !b.is_empty()) {
            return base64_decode(inline).map_err(|e| VaultError::Crypto(format!("{e:#}")));
        }

        let locator = record
            .proof_locator
            .as_deref()
            .filter(|l| !l.is_empty())
            .ok_or(VaultError::MissingDownloadMetadata)?;
        debug!(locator = %locator, "fetching proof package");

        let bytes = self
            .proofs
            .get_first(locator)
            .await
            .map_err(|e| VaultError::Storage(format!("{e:#}")))?;
        let package = ProofPackage::from_bytes(&bytes)
            .map_err(|e| VaultError::ProofIntegrity(format!("{e:#}")))?;

        if !package.verify_integrity() {
            return Err(VaultError::ProofIntegrity("proof hash does not match contents".into()));
        }
        if package.security_level != record.security_level {
            return Err(VaultError::ProofIntegrity(format!(
                "proof package is for level {}, record says {}",
                package.security_level, record.security_level
            )));
        }
        if package.commitment != record.commitment {
            warn!(locator = %locator, "proof package commitment differs from record");
        }
        package
            .sealed_critical()
            .map_err(|e| VaultError::ProofIntegrity(format!("{e:#}")))
    }
}
