//! wvault-keys: wallet-scoped key derivation and the shared session cache
//!
//! A [`KeySessionStore`] turns a wallet credential into one AES-256 key per
//! security level (via a [`KeyDerivationClient`] and HKDF), caches them for
//! a bounded lifetime, and hands out `Arc` leases to the pipelines.

pub mod client;
pub mod credential;
pub mod metrics;
pub mod session;

pub use client::{HttpKeyDerivationClient, KeyDerivationClient, RawKeyMaterial};
pub use credential::{
    Credential, CredentialPersistence, KeychainPersistence, MemoryPersistence, ReusableSecret,
    SingleUseAssertion,
};
pub use metrics::SessionMetrics;
pub use session::{KeySessionStore, SessionEvent, SessionSnapshot};
