//! AES-256-GCM encryption of the two file segments
//!
//! Critical segment format (binary):
//! ```text
//! [12 bytes: random IV][N bytes: ciphertext][16 bytes: GCM tag]
//! AAD = "wvault/critical" || level (1 byte)
//! ```
//!
//! Bulk content format (binary, IV stored in the file record):
//! ```text
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! AAD = "wvault/content" || level (1 byte)
//! ```
//!
//! The critical segment carries its own IV so that a single (key, IV) pair
//! is never used for two messages. The AAD binds each ciphertext to its
//! segment and security level, so swapping segments or relabeling a record's
//! level makes decryption fail.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::level::DerivedEncryptionKey;
use crate::{IV_SIZE, TAG_SIZE};

/// Which part of a file a ciphertext belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Critical,
    Content,
}

impl Segment {
    fn label(self) -> &'static [u8] {
        match self {
            Segment::Critical => b"wvault/critical",
            Segment::Content => b"wvault/content",
        }
    }
}

/// Generate a random 96-bit IV.
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt bulk content with the caller-supplied file IV.
///
/// Returns `[ciphertext][16-byte tag]`.
pub fn encrypt_content(
    key: &DerivedEncryptionKey,
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    encrypt(key, Segment::Content, iv, plaintext)
        .map_err(|e| anyhow::anyhow!("content encryption failed: {e}"))
}

/// Decrypt bulk content produced by [`encrypt_content`].
pub fn decrypt_content(
    key: &DerivedEncryptionKey,
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        anyhow::bail!(
            "encrypted content too short: {} bytes (minimum {TAG_SIZE})",
            ciphertext.len()
        );
    }
    decrypt(key, Segment::Content, iv, ciphertext).map_err(|_| {
        anyhow::anyhow!("content decryption failed: invalid key, wrong IV, or corrupted data")
    })
}

/// Encrypt the critical segment under a fresh random IV.
///
/// Returns `[12-byte IV][ciphertext][16-byte tag]`.
pub fn seal_critical(key: &DerivedEncryptionKey, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
    let iv = generate_iv();
    let ciphertext = encrypt(key, Segment::Critical, &iv, plaintext)
        .map_err(|e| anyhow::anyhow!("critical bytes encryption failed: {e}"))?;

    let mut result = Vec::with_capacity(IV_SIZE + ciphertext.len());
    result.extend_from_slice(&iv);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt the output of [`seal_critical`].
pub fn open_critical(key: &DerivedEncryptionKey, sealed: &[u8]) -> anyhow::Result<Vec<u8>> {
    if sealed.len() < IV_SIZE + TAG_SIZE {
        anyhow::bail!(
            "sealed critical bytes too short: {} bytes (minimum {})",
            sealed.len(),
            IV_SIZE + TAG_SIZE
        );
    }

    let (iv_bytes, ciphertext) = sealed.split_at(IV_SIZE);
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(iv_bytes);

    decrypt(key, Segment::Critical, &iv, ciphertext).map_err(|_| {
        anyhow::anyhow!("critical bytes decryption failed: invalid key or corrupted data")
    })
}

fn encrypt(
    key: &DerivedEncryptionKey,
    segment: Segment,
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, aes_gcm::Error> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let aad = build_aad(segment, key);
    cipher.encrypt(
        Nonce::from_slice(iv),
        Payload {
            msg: plaintext,
            aad: &aad,
        },
    )
}

fn decrypt(
    key: &DerivedEncryptionKey,
    segment: Segment,
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, aes_gcm::Error> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let aad = build_aad(segment, key);
    cipher.decrypt(
        Nonce::from_slice(iv),
        Payload {
            msg: ciphertext,
            aad: &aad,
        },
    )
}

/// Build AAD: segment label || level (1 byte)
fn build_aad(segment: Segment, key: &DerivedEncryptionKey) -> Vec<u8> {
    let label = segment.label();
    let mut aad = Vec::with_capacity(label.len() + 1);
    aad.extend_from_slice(label);
    aad.push(key.level().as_u8());
    aad
}
