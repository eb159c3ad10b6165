//! wvault-crypto: client-side encryption for wallet-derived keys
//!
//! Pipeline: file → split(critical prefix, bulk) → AES-256-GCM each segment → commitment → upload
//!
//! Key hierarchy:
//! ```text
//! Raw key material (per level, from the key-material endpoint)
//!   └── HKDF-SHA256 (salt="wvault-hkdf-salt-v1")
//!       ├── Level encryption key  (info="wvault-level-{n}-encryption")
//!       └── Level key fingerprint (info="wvault-level-{n}-fingerprint")
//!
//! Critical segment: AES-256-GCM (key=level_key, iv=random_96bit prefixed, AAD="wvault/critical"||level)
//! Bulk content:     AES-256-GCM (key=level_key, iv=file_iv,               AAD="wvault/content"||level)
//! Commitment:       SHA-256("wvault-commitment-v1" || fingerprint || len||critical_ct || len||content_ct)
//! ```

pub mod commitment;
pub mod encoding;
pub mod level;
pub mod proof;
pub mod segment;

pub use commitment::{
    compute_commitment, plaintext_digest, verify_commitment, verify_plaintext_digest, Commitment,
};
pub use level::{derive_level_key, DerivedEncryptionKey, KeyFingerprint};
pub use proof::ProofPackage;
pub use segment::{
    decrypt_content, encrypt_content, generate_iv, open_critical, seal_critical, Segment,
};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
