//! Storage collaborator contract

use anyhow::Result;
use async_trait::async_trait;

/// A single storage backend that accepts opaque encrypted payloads.
///
/// Implementations own their transport, retry, and timeout policy; the
/// pipelines never retry on their own.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Name used in logs and partial-failure reports.
    fn name(&self) -> &str;

    /// Store `bytes`, returning a locator for [`StorageProvider::get`].
    async fn put(&self, bytes: Vec<u8>) -> Result<String>;

    /// Fetch the payload stored under `locator`.
    async fn get(&self, locator: &str) -> Result<Vec<u8>>;

    /// Cheap reachability check.
    async fn check(&self) -> Result<()> {
        Ok(())
    }
}
