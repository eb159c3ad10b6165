//! Standard (RFC 4648) base64 helpers for IVs and ciphertexts stored in
//! file records and proof packages.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn base64_decode(s: &str) -> anyhow::Result<Vec<u8>> {
    STANDARD
        .decode(s)
        .map_err(|e| anyhow::anyhow!("base64 decode: {e}"))
}

/// Decode a base64 IV and check its length.
pub fn decode_iv(s: &str) -> anyhow::Result<[u8; crate::IV_SIZE]> {
    let bytes = base64_decode(s)?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        anyhow::anyhow!(
            "IV has wrong size: {} bytes (expected {})",
            v.len(),
            crate::IV_SIZE
        )
    })
}
