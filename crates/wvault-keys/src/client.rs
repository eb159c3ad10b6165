//! Client side of the key-material endpoint

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

use wvault_core::config::DerivationConfig;
use wvault_core::{SecurityLevel, VaultError, VaultResult};

use crate::credential::Credential;

/// Per-level input key material as returned by the endpoint.
///
/// Always covers every [`SecurityLevel`]; construction fails otherwise.
pub struct RawKeyMaterial {
    levels: BTreeMap<SecurityLevel, Zeroizing<Vec<u8>>>,
}

impl RawKeyMaterial {
    /// Build from raw bytes per level. Any missing level rejects the whole set.
    pub fn from_levels(
        mut levels: BTreeMap<SecurityLevel, Vec<u8>>,
    ) -> VaultResult<Self> {
        let mut out = BTreeMap::new();
        for level in SecurityLevel::ALL {
            let bytes = levels
                .remove(&level)
                .ok_or(VaultError::MissingKeyForLevel(level))?;
            out.insert(level, Zeroizing::new(bytes));
        }
        Ok(Self { levels: out })
    }

    /// Parse the endpoint's `{"1": hex, "2": hex, "3": hex}` map.
    pub fn from_hex_map(keys: &HashMap<String, String>) -> VaultResult<Self> {
        let mut levels = BTreeMap::new();
        for level in SecurityLevel::ALL {
            let encoded = keys
                .get(&level.as_u8().to_string())
                .ok_or(VaultError::MissingKeyForLevel(level))?;
            let bytes = hex::decode(encoded.trim()).map_err(|e| {
                VaultError::DerivationFailed(format!("key material for level {level} is not hex: {e}"))
            })?;
            if bytes.is_empty() {
                return Err(VaultError::MissingKeyForLevel(level));
            }
            levels.insert(level, bytes);
        }
        Self::from_levels(levels)
    }

    pub fn level(&self, level: SecurityLevel) -> Option<&[u8]> {
        self.levels.get(&level).map(|b| b.as_slice())
    }
}

impl std::fmt::Debug for RawKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawKeyMaterial")
            .field("levels", &self.levels.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Exchanges a wallet credential for raw key material.
///
/// The credential is taken by value so a single-use assertion is consumed
/// by exactly one call.
#[async_trait]
pub trait KeyDerivationClient: Send + Sync {
    async fn fetch_key_material(
        &self,
        wallet: &str,
        credential: Credential,
    ) -> VaultResult<RawKeyMaterial>;
}

#[derive(Serialize)]
struct DeriveRequest<'a> {
    wallet_address: &'a str,
    credential_kind: &'a str,
    credential: &'a str,
}

#[derive(Deserialize)]
struct DeriveResponse {
    keys: HashMap<String, String>,
}

/// HTTP client for the key-material endpoint.
pub struct HttpKeyDerivationClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpKeyDerivationClient {
    pub fn new(config: &DerivationConfig) -> VaultResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VaultError::Config(format!("building HTTP client: {e}")))?;

        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        info!(endpoint = %endpoint, "key derivation client configured");

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl KeyDerivationClient for HttpKeyDerivationClient {
    async fn fetch_key_material(
        &self,
        wallet: &str,
        credential: Credential,
    ) -> VaultResult<RawKeyMaterial> {
        let body = DeriveRequest {
            wallet_address: wallet,
            credential_kind: credential.kind(),
            credential: credential.expose_secret(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| VaultError::DerivationFailed(format!("key endpoint request: {e}")))?;
        drop(credential);

        let status = resp.status();
        if !status.is_success() {
            return Err(VaultError::DerivationFailed(format!(
                "key endpoint returned {status}"
            )));
        }

        let mut parsed: DeriveResponse = resp
            .json()
            .await
            .map_err(|e| VaultError::DerivationFailed(format!("key endpoint response: {e}")))?;

        let material = RawKeyMaterial::from_hex_map(&parsed.keys);
        for v in parsed.keys.values_mut() {
            v.zeroize();
        }
        debug!(wallet = %wallet, ok = material.is_ok(), "fetched key material");
        material
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_map(levels: &[u8]) -> HashMap<String, String> {
        levels
            .iter()
            .map(|l| (l.to_string(), hex::encode([*l; 32])))
            .collect()
    }

    #[test]
    fn test_parse_complete_material() {
        let m = RawKeyMaterial::from_hex_map(&hex_map(&[1, 2, 3])).unwrap();
        for level in SecurityLevel::ALL {
            assert_eq!(m.level(level).unwrap(), &[level.as_u8(); 32]);
        }
    }

    #[test]
    fn test_missing_level_rejects_whole_response() {
        let err = RawKeyMaterial::from_hex_map(&hex_map(&[1, 3])).unwrap_err();
        assert_eq!(err, VaultError::MissingKeyForLevel(SecurityLevel::Sensitive));
    }

    #[test]
    fn test_bad_hex_is_derivation_failure() {
        let mut keys = hex_map(&[1, 2, 3]);
        keys.insert("2".into(), "zz".into());
        assert!(matches!(
            RawKeyMaterial::from_hex_map(&keys),
            Err(VaultError::DerivationFailed(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let body = DeriveRequest {
            wallet_address: "0xabc",
            credential_kind: "single_use",
            credential: "sig",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["wallet_address"], "0xabc");
        assert_eq!(json["credential_kind"], "single_use");
        assert_eq!(json["credential"], "sig");
    }

    #[test]
    fn test_response_shape() {
        let parsed: DeriveResponse =
            serde_json::from_str(r#"{"keys":{"1":"aa","2":"bb","3":"cc"}}"#).unwrap();
        assert_eq!(parsed.keys.len(), 3);
    }

    #[test]
    fn test_debug_hides_bytes() {
        let m = RawKeyMaterial::from_hex_map(&hex_map(&[1, 2, 3])).unwrap();
        let dbg = format!("{m:?}");
        assert!(!dbg.contains("01, 01"));
        assert!(dbg.contains("Standard"));
    }
}
