//! wvault-storage: storage collaborators for encrypted content and proof packages

pub mod health;
pub mod operator;
pub mod provider;
pub mod set;

pub use health::{check_health, healthy_count};
pub use operator::{build_operator, build_provider, OpendalProvider};
pub use provider::StorageProvider;
pub use set::{ProviderSet, PutReceipt};
