//! Per-level key derivation: raw key material → AES-256 key + fingerprint

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use wvault_core::SecurityLevel;

use crate::KEY_SIZE;

/// HKDF salt shared by every level
pub const HKDF_SALT: &[u8] = b"wvault-hkdf-salt-v1";

/// Shortest raw key material accepted from the key-material endpoint
pub const MIN_MATERIAL_LEN: usize = 32;

fn encryption_info(level: SecurityLevel) -> String {
    format!("wvault-level-{}-encryption", level.as_u8())
}

fn fingerprint_info(level: SecurityLevel) -> String {
    format!("wvault-level-{}-fingerprint", level.as_u8())
}

/// One-way fingerprint of a level key.
///
/// Derived from the same material as the key but under a separate HKDF
/// info string, so it can be mixed into commitments without revealing
/// anything about the key itself.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyFingerprint([u8; 32]);

impl KeyFingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for KeyFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyFingerprint({})", &self.to_hex()[..16])
    }
}

/// A 256-bit AES key for one security level and one wallet.
///
/// Lives only in process memory; not serializable, zeroized on drop.
pub struct DerivedEncryptionKey {
    level: SecurityLevel,
    wallet: String,
    bytes: [u8; KEY_SIZE],
    fingerprint: KeyFingerprint,
}

impl DerivedEncryptionKey {
    pub fn level(&self) -> SecurityLevel {
        self.level
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    pub fn fingerprint(&self) -> &KeyFingerprint {
        &self.fingerprint
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    #[cfg(test)]
    pub(crate) fn for_tests(level: SecurityLevel, seed: u8) -> Self {
        derive_level_key(&[seed; MIN_MATERIAL_LEN], level, "test-wallet")
            .expect("fixed-size material")
    }
}

impl Drop for DerivedEncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedEncryptionKey")
            .field("level", &self.level)
            .field("wallet", &self.wallet)
            .field("bytes", &"[REDACTED]")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Derive the encryption key and fingerprint for `level` from raw material.
pub fn derive_level_key(
    material: &[u8],
    level: SecurityLevel,
    wallet: &str,
) -> anyhow::Result<DerivedEncryptionKey> {
    if material.len() < MIN_MATERIAL_LEN {
        anyhow::bail!(
            "key material for level {level} too short: {} bytes (minimum {MIN_MATERIAL_LEN})",
            material.len()
        );
    }

    let hkdf = Hkdf::<Sha256>::new(Some(HKDF_SALT), material);

    let mut bytes = [0u8; KEY_SIZE];
    hkdf.expand(encryption_info(level).as_bytes(), &mut bytes)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;

    let mut fingerprint = [0u8; 32];
    hkdf.expand(fingerprint_info(level).as_bytes(), &mut fingerprint)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;

    Ok(DerivedEncryptionKey {
        level,
        wallet: wallet.to_string(),
        bytes,
        fingerprint: KeyFingerprint(fingerprint),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATERIAL: [u8; 32] = [0x42; 32];

    #[test]
    fn test_derivation_deterministic() {
        let k1 = derive_level_key(&MATERIAL, SecurityLevel::Standard, "w").unwrap();
        let k2 = derive_level_key(&MATERIAL, SecurityLevel::Standard, "w").unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_eq!(k1.fingerprint(), k2.fingerprint());
    }

    #[test]
    fn test_levels_are_separated() {
        let keys: Vec<_> = SecurityLevel::ALL
            .iter()
            .map(|&l| derive_level_key(&MATERIAL, l, "w").unwrap())
            .collect();
        assert_ne!(keys[0].as_bytes(), keys[1].as_bytes());
        assert_ne!(keys[1].as_bytes(), keys[2].as_bytes());
        assert_ne!(keys[0].fingerprint(), keys[2].fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_from_key() {
        let key = derive_level_key(&MATERIAL, SecurityLevel::Maximum, "w").unwrap();
        assert_ne!(key.as_bytes(), key.fingerprint().as_bytes());
    }

    #[test]
    fn test_short_material_rejected() {
        let err = derive_level_key(&[1u8; 16], SecurityLevel::Sensitive, "w").unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = derive_level_key(&MATERIAL, SecurityLevel::Standard, "w").unwrap();
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains(&hex::encode(key.as_bytes())));
    }
}
