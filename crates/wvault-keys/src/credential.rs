//! Wallet credentials and persistence of the reusable kind.
//!
//! Keychain access uses the `keyring` crate:
//! - macOS: Keychain Services
//! - Linux: GNOME Keyring / Secret Service (D-Bus)
//! - Windows: Credential Manager (DPAPI)

use std::sync::{Arc, Mutex};

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

/// A proof-of-ownership secret that may be presented more than once
/// (e.g. a deterministic signature over a fixed message).
pub struct ReusableSecret(SecretString);

impl ReusableSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::from(secret.into()))
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ReusableSecret {
    fn clone(&self) -> Self {
        Self::new(self.expose_secret().to_owned())
    }
}

impl std::fmt::Debug for ReusableSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReusableSecret([REDACTED])")
    }
}

/// A one-shot assertion (e.g. a WebAuthn response). Not `Clone`: it is moved
/// into the derivation call and gone afterwards.
pub struct SingleUseAssertion(SecretString);

impl SingleUseAssertion {
    pub fn new(assertion: impl Into<String>) -> Self {
        Self(SecretString::from(assertion.into()))
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SingleUseAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SingleUseAssertion([REDACTED])")
    }
}

#[derive(Debug)]
pub enum Credential {
    Reusable(ReusableSecret),
    SingleUse(SingleUseAssertion),
}

impl Credential {
    pub fn reusable(secret: impl Into<String>) -> Self {
        Credential::Reusable(ReusableSecret::new(secret))
    }

    pub fn single_use(assertion: impl Into<String>) -> Self {
        Credential::SingleUse(SingleUseAssertion::new(assertion))
    }

    /// Wire name sent to the key-material endpoint.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Reusable(_) => "reusable",
            Credential::SingleUse(_) => "single_use",
        }
    }

    pub fn expose_secret(&self) -> &str {
        match self {
            Credential::Reusable(s) => s.expose_secret(),
            Credential::SingleUse(a) => a.expose_secret(),
        }
    }
}

/// Durable storage for the reusable credential, so a restarted process can
/// re-derive keys without prompting.
///
/// Only [`ReusableSecret`] can be stored; single-use assertions have no path
/// into persistence.
pub trait CredentialPersistence: Send + Sync {
    fn load(&self) -> Result<Option<ReusableSecret>>;
    fn store(&self, secret: &ReusableSecret) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Platform keychain persistence under `(service, key)`.
pub struct KeychainPersistence {
    service: String,
    key: String,
}

impl KeychainPersistence {
    pub fn new(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            key: key.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.key)
            .map_err(|e| anyhow::anyhow!("keychain entry creation: {e}"))
    }
}

impl CredentialPersistence for KeychainPersistence {
    fn load(&self) -> Result<Option<ReusableSecret>> {
        match self.entry()?.get_password() {
            Ok(mut password) => {
                let secret = ReusableSecret::new(password.clone());
                password.zeroize();
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("keychain get for '{}': {e}", self.key)),
        }
    }

    fn store(&self, secret: &ReusableSecret) -> Result<()> {
        self.entry()?
            .set_password(secret.expose_secret())
            .map_err(|e| anyhow::anyhow!("keychain store for '{}': {e}", self.key))?;
        tracing::debug!(key = %self.key, "stored credential in platform keychain");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                tracing::debug!(key = %self.key, "deleted credential from platform keychain");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()), // already deleted
            Err(e) => Err(anyhow::anyhow!("keychain delete for '{}': {e}", self.key)),
        }
    }
}

/// In-process persistence. Clones share the same slot, which lets tests
/// simulate a restart by building a second store on the same instance.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().map(|s| s.is_none()).unwrap_or(true)
    }

    fn with_slot<T>(&self, f: impl FnOnce(&mut Option<String>) -> T) -> Result<T> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("memory persistence lock poisoned"))?;
        Ok(f(&mut slot))
    }
}

impl CredentialPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<ReusableSecret>> {
        self.with_slot(|slot| slot.as_deref().map(ReusableSecret::new))
    }

    fn store(&self, secret: &ReusableSecret) -> Result<()> {
        self.with_slot(|slot| {
            if let Some(old) = slot.as_mut() {
                old.zeroize();
            }
            *slot = Some(secret.expose_secret().to_owned());
        })
    }

    fn clear(&self) -> Result<()> {
        self.with_slot(|slot| {
            if let Some(mut old) = slot.take() {
                old.zeroize();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let c = Credential::reusable("hunter2");
        assert!(!format!("{c:?}").contains("hunter2"));
        let c = Credential::single_use("one-shot");
        assert!(!format!("{c:?}").contains("one-shot"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Credential::reusable("x").kind(), "reusable");
        assert_eq!(Credential::single_use("x").kind(), "single_use");
    }

    #[test]
    fn test_memory_persistence_lifecycle() {
        let p = MemoryPersistence::new();
        assert!(p.load().unwrap().is_none());

        p.store(&ReusableSecret::new("sig")).unwrap();
        let shared = p.clone();
        assert_eq!(shared.load().unwrap().unwrap().expose_secret(), "sig");

        shared.clear().unwrap();
        assert!(p.is_empty());
        assert!(p.load().unwrap().is_none());
    }

    #[test]
    fn test_reusable_clone_is_independent() {
        let a = ReusableSecret::new("sig");
        let b = a.clone();
        drop(a);
        assert_eq!(b.expose_secret(), "sig");
    }
}
