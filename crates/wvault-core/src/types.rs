use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Protection tier for a key and every payload encrypted under it.
///
/// Ordered by increasing protection requirement and serialized as its
/// numeric value (1, 2, 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SecurityLevel {
    Standard = 1,
    Sensitive = 2,
    Maximum = 3,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 3] = [
        SecurityLevel::Standard,
        SecurityLevel::Sensitive,
        SecurityLevel::Maximum,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            SecurityLevel::Standard => "standard",
            SecurityLevel::Sensitive => "sensitive",
            SecurityLevel::Maximum => "maximum",
        }
    }
}

impl TryFrom<u8> for SecurityLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SecurityLevel::Standard),
            2 => Ok(SecurityLevel::Sensitive),
            3 => Ok(SecurityLevel::Maximum),
            other => Err(format!("unknown security level: {other}")),
        }
    }
}

impl From<SecurityLevel> for u8 {
    fn from(level: SecurityLevel) -> u8 {
        level.as_u8()
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted description of one encrypted upload.
///
/// Written by the upload pipeline and handed to an external database; the
/// download pipeline needs nothing else to recover the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Locator of the encrypted bulk content
    pub content_locator: String,
    /// Locator of the proof package holding the encrypted critical bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_locator: Option<String>,
    /// Encrypted critical bytes (base64), when kept inline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_critical_bytes: Option<String>,
    /// IV used for the bulk content (base64)
    pub file_iv: String,
    /// Commitment over both ciphertexts and the key fingerprint (hex)
    pub commitment: String,
    pub security_level: SecurityLevel,
    pub file_name: String,
    /// Plaintext size in bytes
    #[serde(default)]
    pub content_size: u64,
    /// SHA-256 of the plaintext (hex), checked after decryption when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
}

impl FileRecord {
    /// Check that the record carries a path to the critical bytes.
    ///
    /// Legacy records may have neither; they cannot be decrypted and must be
    /// rejected before any network call is made.
    pub fn validate_for_download(&self) -> VaultResult<()> {
        let has_proof = self
            .proof_locator
            .as_deref()
            .is_some_and(|l| !l.is_empty());
        let has_inline = self
            .encrypted_critical_bytes
            .as_deref()
            .is_some_and(|b| !b.is_empty());
        if has_proof || has_inline {
            Ok(())
        } else {
            Err(VaultError::MissingDownloadMetadata)
        }
    }
}

/// A storage provider that rejected a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

/// Outcome of an upload.
///
/// Partial provider failure is reported here rather than as an error: the
/// upload succeeded as long as one provider accepted the content.
#[derive(Debug, Clone)]
pub struct EncryptionResult {
    pub success: bool,
    pub commitment: String,
    pub record: FileRecord,
    pub successful_providers: usize,
    pub total_providers: usize,
    pub provider_failures: Vec<ProviderFailure>,
}

impl EncryptionResult {
    /// Some but not all providers accepted the content.
    pub fn is_partial(&self) -> bool {
        self.successful_providers > 0 && self.successful_providers < self.total_providers
    }
}

/// Outcome of a download.
///
/// `commitment_valid` is the tamper signal and is kept separate from
/// `success`: a file can decrypt and still fail commitment verification.
#[derive(Clone)]
pub struct DecryptionResult {
    pub success: bool,
    pub data: Vec<u8>,
    pub file_name: String,
    pub security_level: SecurityLevel,
    /// Commitment recomputed from the retrieved ciphertexts
    pub commitment: String,
    pub commitment_valid: bool,
    /// Decryption succeeded and the commitment matched
    pub verified: bool,
}

impl std::fmt::Debug for DecryptionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionResult")
            .field("success", &self.success)
            .field("data", &format_args!("[{} bytes]", self.data.len()))
            .field("file_name", &self.file_name)
            .field("security_level", &self.security_level)
            .field("commitment", &self.commitment)
            .field("commitment_valid", &self.commitment_valid)
            .field("verified", &self.verified)
            .finish()
    }
}
