//! Key session store: the process-wide cache of derived level keys
//!
//! State lives behind a `std::sync::RwLock` that is never held across an
//! `.await`. The only lock held across network I/O is the derivation guard;
//! callers that queue on it while another derivation runs get that
//! derivation's outcome instead of starting their own.
//!
//! Expiry is checked lazily on access. There is no timer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use wvault_core::config::{SessionConfig, WvaultConfig};
use wvault_core::{SecurityLevel, VaultError, VaultResult};
use wvault_crypto::{derive_level_key, DerivedEncryptionKey};

use crate::client::{HttpKeyDerivationClient, KeyDerivationClient};
use crate::credential::{
    Credential, CredentialPersistence, KeychainPersistence, ReusableSecret,
};
use crate::metrics::SessionMetrics;

/// Notifications about session lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Initialized { wallet: String },
    Cleared,
    Expired { wallet: String },
    DerivationFailed { error: VaultError },
}

/// Read-only view of the current session for status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub wallet: Option<String>,
    pub levels: Vec<SecurityLevel>,
    pub created_at: Option<Instant>,
    pub expires_at: Option<Instant>,
    pub complete: bool,
    pub expired: bool,
}

struct KeyDerivationSession {
    wallet: String,
    keys: HashMap<SecurityLevel, Arc<DerivedEncryptionKey>>,
    created_at: Instant,
    expires_at: Instant,
    complete: bool,
}

impl KeyDerivationSession {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn is_usable_for(&self, wallet: &str, now: Instant) -> bool {
        self.complete && self.wallet == wallet && !self.is_expired(now)
    }
}

#[derive(Default)]
struct State {
    wallet: Option<String>,
    session: Option<Arc<KeyDerivationSession>>,
    cached_credential: Option<ReusableSecret>,
    /// Bumped once per finished derivation attempt.
    generation: u64,
    last_outcome: Option<VaultResult<()>>,
    /// Wallet the last derivation attempt ran for.
    last_wallet: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialSource {
    Explicit,
    Cached,
}

struct Inner {
    client: Arc<dyn KeyDerivationClient>,
    persistence: Arc<dyn CredentialPersistence>,
    ttl: Duration,
    state: RwLock<State>,
    derive_guard: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    metrics: SessionMetrics,
}

/// Cloneable handle to the shared key cache.
#[derive(Clone)]
pub struct KeySessionStore {
    inner: Arc<Inner>,
}

impl KeySessionStore {
    pub fn new(
        client: Arc<dyn KeyDerivationClient>,
        persistence: Arc<dyn CredentialPersistence>,
        config: &SessionConfig,
    ) -> Self {
        Self::with_metrics(client, persistence, config, SessionMetrics::default())
    }

    pub fn with_metrics(
        client: Arc<dyn KeyDerivationClient>,
        persistence: Arc<dyn CredentialPersistence>,
        config: &SessionConfig,
        metrics: SessionMetrics,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                client,
                persistence,
                ttl: Duration::from_secs(config.ttl_secs),
                state: RwLock::new(State::default()),
                derive_guard: Mutex::new(()),
                events,
                metrics,
            }),
        }
    }

    /// Build a store with the HTTP endpoint client and keychain persistence.
    pub fn from_config(config: &WvaultConfig) -> VaultResult<Self> {
        config.validate()?;
        let client = HttpKeyDerivationClient::new(&config.derivation)?;
        let persistence = KeychainPersistence::new(
            &config.session.keychain_service,
            &config.session.credential_key,
        );
        Ok(Self::new(
            Arc::new(client),
            Arc::new(persistence),
            &config.session,
        ))
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.inner.metrics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // Poisoning only means another thread panicked mid-update; every write is
    // a whole-value assignment, so the state is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Bind the store to `address`. A different wallet drops every cached key
    /// and credential belonging to the previous one.
    pub fn associate_wallet(&self, address: impl Into<String>) {
        let address = address.into();
        let previous = {
            let mut st = self.write();
            if st.wallet.as_deref() == Some(address.as_str()) {
                return;
            }
            let previous = st.wallet.replace(address.clone());
            if previous.is_some() {
                st.session = None;
                st.cached_credential = None;
            }
            previous
        };

        info!(wallet = %address, "wallet associated");
        if let Some(previous) = previous {
            debug!(previous = %previous, "wallet changed, clearing session");
            self.clear_persisted();
            self.emit(SessionEvent::Cleared);
        }
    }

    /// Remove the wallet association and wipe all key state.
    pub fn disconnect_wallet(&self) {
        self.write().wallet = None;
        info!("wallet disconnected");
        self.clear_keys();
    }

    pub fn wallet(&self) -> Option<String> {
        self.read().wallet.clone()
    }

    fn require_wallet(&self) -> VaultResult<String> {
        self.wallet().ok_or(VaultError::NoWalletAssociated)
    }

    /// Wipe the session, the in-memory credential and the persisted one.
    pub fn clear_keys(&self) {
        {
            let mut st = self.write();
            st.session = None;
            st.cached_credential = None;
        }
        self.clear_persisted();
        debug!("key session cleared");
        self.emit(SessionEvent::Cleared);
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.inner.persistence.clear() {
            warn!("failed to clear persisted credential: {e:#}");
        }
    }

    /// Synchronous membership check. False for an expired session.
    pub fn has_key(&self, level: SecurityLevel) -> bool {
        let st = self.read();
        match (&st.wallet, &st.session) {
            (Some(wallet), Some(session)) => {
                session.is_usable_for(wallet, Instant::now()) && session.keys.contains_key(&level)
            }
            _ => false,
        }
    }

    pub fn session_snapshot(&self) -> SessionSnapshot {
        let st = self.read();
        let now = Instant::now();
        match &st.session {
            Some(s) => {
                let mut levels: Vec<_> = s.keys.keys().copied().collect();
                levels.sort();
                SessionSnapshot {
                    wallet: st.wallet.clone(),
                    levels,
                    created_at: Some(s.created_at),
                    expires_at: Some(s.expires_at),
                    complete: s.complete,
                    expired: s.is_expired(now),
                }
            }
            None => SessionSnapshot {
                wallet: st.wallet.clone(),
                levels: Vec::new(),
                created_at: None,
                expires_at: None,
                complete: false,
                expired: false,
            },
        }
    }

    /// Return the live session for `wallet`, dropping it if it has expired.
    fn active_session(&self, wallet: &str) -> Option<Arc<KeyDerivationSession>> {
        let now = Instant::now();
        let session = self.read().session.clone()?;
        if session.is_usable_for(wallet, now) {
            return Some(session);
        }
        if session.is_expired(now) {
            let removed = {
                let mut st = self.write();
                match &st.session {
                    Some(current) if Arc::ptr_eq(current, &session) => {
                        st.session = None;
                        true
                    }
                    _ => false,
                }
            };
            if removed {
                self.inner.metrics.expiries.inc();
                info!(wallet = %session.wallet, "key session expired");
                self.emit(SessionEvent::Expired {
                    wallet: session.wallet.clone(),
                });
            }
        }
        None
    }

    /// Ensure a complete, unexpired session exists for the associated wallet.
    ///
    /// With `None`, falls back to the cached reusable credential and then the
    /// persisted one. Returns `NeedsCredential` when neither exists.
    pub async fn initialize_keys(&self, credential: Option<Credential>) -> VaultResult<()> {
        let wallet = self.require_wallet()?;
        if self.active_session(&wallet).is_some() {
            return Ok(());
        }

        let observed = self.generation();
        let _guard = self.inner.derive_guard.lock().await;

        {
            let st = self.read();
            // A derivation for another wallet says nothing about this caller.
            if st.generation != observed && st.last_wallet.as_deref() == Some(wallet.as_str()) {
                self.inner.metrics.coalesced_waits.inc();
                if let Some(outcome) = st.last_outcome.clone() {
                    debug!(wallet = %wallet, ok = outcome.is_ok(), "joined in-flight derivation");
                    return outcome;
                }
            }
        }
        if self.active_session(&wallet).is_some() {
            return Ok(());
        }

        let (credential, source) = match credential {
            Some(c) => (c, CredentialSource::Explicit),
            None => match self.resolve_cached_credential() {
                Some(secret) => (Credential::Reusable(secret), CredentialSource::Cached),
                None => return Err(VaultError::NeedsCredential),
            },
        };

        self.run_derivation(&wallet, credential, source).await
    }

    /// Return the key for `level`, re-deriving once from a cached reusable
    /// credential if the session is missing or expired. Never prompts.
    pub async fn get_key(&self, level: SecurityLevel) -> VaultResult<Arc<DerivedEncryptionKey>> {
        let wallet = self.require_wallet()?;
        if let Some(key) = self.lookup(&wallet, level) {
            return Ok(key);
        }
        self.initialize_keys(None).await?;
        self.lookup(&wallet, level)
            .ok_or(VaultError::MissingKeyForLevel(level))
            .map_err(surface_missing_level)
    }

    /// Force a fresh derivation from the last reusable credential.
    pub async fn refresh_key(
        &self,
        level: SecurityLevel,
    ) -> VaultResult<Arc<DerivedEncryptionKey>> {
        let wallet = self.require_wallet()?;
        {
            let _guard = self.inner.derive_guard.lock().await;
            let secret = self
                .resolve_cached_credential()
                .ok_or(VaultError::NeedsCredential)?;
            info!(wallet = %wallet, %level, "forcing key re-derivation");
            self.run_derivation(&wallet, Credential::Reusable(secret), CredentialSource::Cached)
                .await?;
        }
        self.lookup(&wallet, level)
            .ok_or(VaultError::MissingKeyForLevel(level))
            .map_err(surface_missing_level)
    }

    fn lookup(&self, wallet: &str, level: SecurityLevel) -> Option<Arc<DerivedEncryptionKey>> {
        self.active_session(wallet)
            .and_then(|s| s.keys.get(&level).cloned())
    }

    fn resolve_cached_credential(&self) -> Option<ReusableSecret> {
        if let Some(secret) = self.read().cached_credential.clone() {
            return Some(secret);
        }
        match self.inner.persistence.load() {
            Ok(Some(secret)) => {
                debug!("restored reusable credential from persistence");
                self.write().cached_credential = Some(secret.clone());
                Some(secret)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("failed to load persisted credential: {e:#}");
                None
            }
        }
    }

    /// Derive and install a session. Caller holds the derivation guard.
    async fn run_derivation(
        &self,
        wallet: &str,
        credential: Credential,
        source: CredentialSource,
    ) -> VaultResult<()> {
        let reusable = match &credential {
            Credential::Reusable(secret) if source == CredentialSource::Explicit => {
                Some(secret.clone())
            }
            _ => None,
        };

        self.inner.metrics.derivations.inc();
        debug!(wallet = %wallet, kind = credential.kind(), "deriving level keys");

        let result = match self.derive_session(wallet, credential).await {
            Ok(session) => self.install_session(wallet, session, reusable),
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => {
                info!(wallet = %wallet, ttl_secs = self.inner.ttl.as_secs(), "key session initialized");
                self.emit(SessionEvent::Initialized {
                    wallet: wallet.to_string(),
                });
            }
            Err(e) => {
                self.inner.metrics.derivation_failures.inc();
                warn!(wallet = %wallet, "key derivation failed: {e}");
                self.fail_closed(wallet, source, e.clone());
                self.emit(SessionEvent::DerivationFailed { error: e.clone() });
            }
        }
        result
    }

    async fn derive_session(
        &self,
        wallet: &str,
        credential: Credential,
    ) -> VaultResult<KeyDerivationSession> {
        let material = self
            .inner
            .client
            .fetch_key_material(wallet, credential)
            .await
            .map_err(surface_missing_level)?;

        let mut keys = HashMap::with_capacity(SecurityLevel::ALL.len());
        for level in SecurityLevel::ALL {
            let bytes = material
                .level(level)
                .ok_or(VaultError::MissingKeyForLevel(level))
                .map_err(surface_missing_level)?;
            let key = derive_level_key(bytes, level, wallet)
                .map_err(|e| VaultError::DerivationFailed(format!("{e:#}")))?;
            keys.insert(level, Arc::new(key));
        }

        let created_at = Instant::now();
        Ok(KeyDerivationSession {
            wallet: wallet.to_string(),
            complete: keys.len() == SecurityLevel::ALL.len(),
            keys,
            created_at,
            expires_at: created_at + self.inner.ttl,
        })
    }

    fn install_session(
        &self,
        wallet: &str,
        session: KeyDerivationSession,
        reusable: Option<ReusableSecret>,
    ) -> VaultResult<()> {
        {
            let mut st = self.write();
            if st.wallet.as_deref() != Some(wallet) {
                return Err(VaultError::DerivationFailed(
                    "wallet association changed during derivation".into(),
                ));
            }
            st.session = Some(Arc::new(session));
            if let Some(secret) = &reusable {
                st.cached_credential = Some(secret.clone());
            }
            st.generation += 1;
            st.last_outcome = Some(Ok(()));
            st.last_wallet = Some(wallet.to_string());
        }

        if let Some(secret) = reusable {
            if let Err(e) = self.inner.persistence.store(&secret) {
                warn!("failed to persist reusable credential: {e:#}");
            }
        }
        Ok(())
    }

    fn fail_closed(&self, wallet: &str, source: CredentialSource, error: VaultError) {
        {
            let mut st = self.write();
            st.session = None;
            if source == CredentialSource::Cached {
                st.cached_credential = None;
            }
            st.generation += 1;
            st.last_outcome = Some(Err(error));
            st.last_wallet = Some(wallet.to_string());
        }
        if source == CredentialSource::Cached {
            self.clear_persisted();
        }
    }
}

fn surface_missing_level(e: VaultError) -> VaultError {
    match e {
        VaultError::MissingKeyForLevel(level) => {
            VaultError::DerivationFailed(format!("key material missing for level {level}"))
        }
        other => other,
    }
}
