//! Proof package format
//!
//! A proof package carries the encrypted critical bytes of one file,
//! separately from the bulk content:
//! - commitment (hex, same value as the file record)
//! - sealed critical bytes (base64, output of `seal_critical`)
//! - security level the critical bytes were sealed under
//! - proof_hash: SHA-256 over the canonical JSON of the fields above
//!
//! The proof hash lets a downloader reject a corrupted or edited package
//! before attempting decryption.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use wvault_core::SecurityLevel;

use crate::encoding::{base64_decode, base64_encode};

pub const PROOF_VERSION: u32 = 1;

/// A stored proof package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPackage {
    pub version: u32,
    pub commitment: String,
    pub encrypted_critical_bytes: String,
    pub security_level: SecurityLevel,
    /// Unix timestamp (seconds) of package creation
    pub created_at: u64,
    pub proof_hash: String,
}

/// Fields covered by the proof hash, in serialization order
#[derive(Serialize)]
struct ProofHashContent<'a> {
    version: u32,
    commitment: &'a str,
    encrypted_critical_bytes: &'a str,
    security_level: SecurityLevel,
    created_at: u64,
}

impl ProofPackage {
    /// Build a package for sealed critical bytes and compute its proof hash.
    pub fn new(
        commitment: String,
        sealed_critical: &[u8],
        security_level: SecurityLevel,
        created_at: u64,
    ) -> anyhow::Result<Self> {
        let mut package = Self {
            version: PROOF_VERSION,
            commitment,
            encrypted_critical_bytes: base64_encode(sealed_critical),
            security_level,
            created_at,
            proof_hash: String::new(),
        };
        package.proof_hash = package.compute_hash()?;
        Ok(package)
    }

    fn compute_hash(&self) -> anyhow::Result<String> {
        let content = ProofHashContent {
            version: self.version,
            commitment: &self.commitment,
            encrypted_critical_bytes: &self.encrypted_critical_bytes,
            security_level: self.security_level,
            created_at: self.created_at,
        };
        let canonical = serde_json::to_vec(&content)
            .map_err(|e| anyhow::anyhow!("proof hash serialization: {e}"))?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    /// Check the stored proof hash against the package contents.
    pub fn verify_integrity(&self) -> bool {
        match self.compute_hash() {
            Ok(hash) => hash == self.proof_hash,
            Err(_) => false,
        }
    }

    /// Decode the sealed critical bytes.
    pub fn sealed_critical(&self) -> anyhow::Result<Vec<u8>> {
        base64_decode(&self.encrypted_critical_bytes)
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| anyhow::anyhow!("proof package serialization: {e}"))
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| anyhow::anyhow!("proof package deserialization: {e}"))
    }
}
