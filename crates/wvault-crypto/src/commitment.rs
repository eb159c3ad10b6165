//! Commitments binding both ciphertexts to the level key fingerprint
//!
//! ```text
//! commitment = SHA-256(
//!     "wvault-commitment-v1"
//!     || fingerprint (32 bytes)
//!     || len(critical_ct) (8 bytes BE) || critical_ct
//!     || len(content_ct)  (8 bytes BE) || content_ct
//! )
//! ```
//!
//! Length prefixes make the segment boundary part of the digest, so moving
//! bytes from one ciphertext to the other changes the commitment.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::level::KeyFingerprint;

const COMMITMENT_DOMAIN: &[u8] = b"wvault-commitment-v1";

/// A 256-bit commitment, rendered as lowercase hex in file records.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Commitment([u8; 32]);

impl Commitment {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| anyhow::anyhow!("commitment hex: {e}"))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            anyhow::anyhow!("commitment has wrong length: {} bytes (expected 32)", v.len())
        })?;
        Ok(Self(arr))
    }
}

impl std::fmt::Debug for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the commitment over both ciphertexts and the key fingerprint.
pub fn compute_commitment(
    encrypted_critical: &[u8],
    encrypted_content: &[u8],
    fingerprint: &KeyFingerprint,
) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update(COMMITMENT_DOMAIN);
    hasher.update(fingerprint.as_bytes());
    hasher.update((encrypted_critical.len() as u64).to_be_bytes());
    hasher.update(encrypted_critical);
    hasher.update((encrypted_content.len() as u64).to_be_bytes());
    hasher.update(encrypted_content);
    Commitment(hasher.finalize().into())
}

/// Recompute and compare in constant time.
pub fn verify_commitment(
    expected: &Commitment,
    encrypted_critical: &[u8],
    encrypted_content: &[u8],
    fingerprint: &KeyFingerprint,
) -> bool {
    let actual = compute_commitment(encrypted_critical, encrypted_content, fingerprint);
    actual.0.ct_eq(&expected.0).into()
}

/// Like [`verify_commitment`], for a hex commitment read from a file record.
/// Malformed hex never verifies.
pub fn verify_commitment_hex(
    expected_hex: &str,
    encrypted_critical: &[u8],
    encrypted_content: &[u8],
    fingerprint: &KeyFingerprint,
) -> bool {
    match Commitment::from_hex(expected_hex) {
        Ok(expected) => verify_commitment(&expected, encrypted_critical, encrypted_content, fingerprint),
        Err(e) => {
            tracing::warn!("stored commitment is malformed: {e}");
            false
        }
    }
}

/// SHA-256 of the recovered plaintext, lowercase hex.
pub fn plaintext_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare `data` against a recorded plaintext digest in constant time.
/// Malformed hex never matches.
pub fn verify_plaintext_digest(expected_hex: &str, data: &[u8]) -> bool {
    match hex::decode(expected_hex.trim()) {
        Ok(expected) => Sha256::digest(data).as_slice().ct_eq(expected.as_slice()).into(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fp(seed: u8) -> KeyFingerprint {
        KeyFingerprint::from_bytes([seed; 32])
    }

    #[test]
    fn test_deterministic() {
        let a = compute_commitment(b"critical", b"content", &fp(1));
        let b = compute_commitment(b"critical", b"content", &fp(1));
        assert_eq!(a, b);
        assert!(verify_commitment(&a, b"critical", b"content", &fp(1)));
    }

    #[test]
    fn test_fingerprint_is_bound() {
        let a = compute_commitment(b"critical", b"content", &fp(1));
        assert!(!verify_commitment(&a, b"critical", b"content", &fp(2)));
    }

    #[test]
    fn test_segment_boundary_is_bound() {
        let a = compute_commitment(b"ab", b"cd", &fp(1));
        let b = compute_commitment(b"abc", b"d", &fp(1));
        assert_ne!(a, b, "shifting bytes across segments must change the commitment");
    }

    #[test]
    fn test_hex_roundtrip_and_format() {
        let c = compute_commitment(b"x", b"y", &fp(3));
        let hex = c.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(Commitment::from_hex(&hex).unwrap(), c);
        assert!(verify_commitment_hex(&hex, b"x", b"y", &fp(3)));
    }

    #[test]
    fn test_malformed_hex_never_verifies() {
        assert!(Commitment::from_hex("zz").is_err());
        assert!(Commitment::from_hex("abcd").is_err());
        assert!(!verify_commitment_hex("not-hex", b"x", b"y", &fp(3)));
    }

    #[test]
    fn test_plaintext_digest() {
        let digest = plaintext_digest(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(verify_plaintext_digest(&digest, b"abc"));
        assert!(verify_plaintext_digest(&digest.to_uppercase(), b"abc"));
        assert!(!verify_plaintext_digest(&digest, b"abd"));
        assert!(!verify_plaintext_digest("ba78", b"abc"));
        assert!(!verify_plaintext_digest("not-hex", b"abc"));
    }

    proptest! {
        #[test]
        fn prop_any_byte_flip_changes_commitment(
            critical in prop::collection::vec(any::<u8>(), 1..64),
            content in prop::collection::vec(any::<u8>(), 1..512),
            flip_content in any::<bool>(),
            idx in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let f = fp(9);
            let original = compute_commitment(&critical, &content, &f);

            let (mut c1, mut c2) = (critical.clone(), content.clone());
            if flip_content {
                let i = idx.index(c2.len());
                c2[i] ^= mask;
            } else {
                let i = idx.index(c1.len());
                c1[i] ^= mask;
            }

            prop_assert!(!verify_commitment(&original, &c1, &c2, &f));
        }
    }
}
