//! wvault-core: shared types, config schema, and the error taxonomy used by
//! every wvault crate.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use error::{VaultError, VaultResult};
pub use types::{DecryptionResult, EncryptionResult, FileRecord, ProviderFailure, SecurityLevel};
