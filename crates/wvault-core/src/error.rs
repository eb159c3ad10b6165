use thiserror::Error;

use crate::types::{ProviderFailure, SecurityLevel};

pub type VaultResult<T> = Result<T, VaultError>;

/// Error taxonomy shared by the session store and both pipelines.
///
/// `Clone` so that callers coalesced onto one in-flight derivation can all
/// receive the same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("no wallet is associated with this session")]
    NoWalletAssociated,

    #[error("a fresh credential is required to derive keys")]
    NeedsCredential,

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("key material missing for security level {0}")]
    MissingKeyForLevel(SecurityLevel),

    #[error("file record has neither a proof locator nor inline critical bytes")]
    MissingDownloadMetadata,

    #[error("decryption failed: wrong key or corrupted ciphertext (commitment valid: {commitment_valid})")]
    DecryptionFailed { commitment_valid: bool },

    #[error("commitment mismatch: stored content does not match its commitment")]
    CommitmentMismatch,

    #[error("decrypted content does not match the recorded SHA-256")]
    ContentHashMismatch,

    #[error("upload failed: 0 of {attempted} providers accepted the payload")]
    UploadFailed {
        attempted: usize,
        failures: Vec<ProviderFailure>,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("proof package integrity check failed: {0}")]
    ProofIntegrity(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl VaultError {
    /// True if retrying the same call (without user involvement) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::NeedsCredential
                | VaultError::DerivationFailed(_)
                | VaultError::MissingKeyForLevel(_)
                | VaultError::UploadFailed { .. }
                | VaultError::Storage(_)
                | VaultError::Cancelled
        )
    }

    /// True if the caller should prompt the user (reconnect wallet,
    /// re-authenticate) rather than show a generic error.
    pub fn needs_user_action(&self) -> bool {
        matches!(
            self,
            VaultError::NoWalletAssociated | VaultError::NeedsCredential
        )
    }
}
