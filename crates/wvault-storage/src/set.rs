//! Fan-out across several storage providers

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{debug, warn};

use wvault_core::config::ProviderConfig;
use wvault_core::ProviderFailure;

use crate::operator::build_provider;
use crate::provider::StorageProvider;

/// Outcome of storing one payload on every provider in a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    /// Locator from the first provider (in set order) that succeeded.
    pub locator: Option<String>,
    pub successful: usize,
    pub attempted: usize,
    pub failures: Vec<ProviderFailure>,
}

impl PutReceipt {
    pub fn any_succeeded(&self) -> bool {
        self.successful > 0
    }
}

/// An ordered set of providers holding copies of the same payloads.
///
/// Providers are content-addressed, so every successful put of the same
/// bytes yields the same locator.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: Vec<Arc<dyn StorageProvider>>,
}

impl ProviderSet {
    pub fn new(providers: Vec<Arc<dyn StorageProvider>>) -> Self {
        Self { providers }
    }

    /// Build one provider per config entry, in order.
    pub fn from_configs(configs: &[ProviderConfig]) -> Result<Self> {
        let providers = configs
            .iter()
            .map(|cfg| {
                build_provider(cfg)
                    .map(|p| Arc::new(p) as Arc<dyn StorageProvider>)
                    .with_context(|| format!("building provider {}", cfg.name))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(providers))
    }

    pub fn providers(&self) -> &[Arc<dyn StorageProvider>] {
        &self.providers
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Store `bytes` on every provider concurrently.
    ///
    /// Never fails as a whole; callers decide what a zero-success receipt means.
    pub async fn put_all(&self, bytes: &[u8]) -> PutReceipt {
        let puts = self.providers.iter().map(|p| {
            let payload = bytes.to_vec();
            async move { (p.name().to_string(), p.put(payload).await) }
        });
        let results = join_all(puts).await;

        let mut receipt = PutReceipt {
            locator: None,
            successful: 0,
            attempted: results.len(),
            failures: Vec::new(),
        };
        for (provider, result) in results {
            match result {
                Ok(locator) => {
                    receipt.successful += 1;
                    if receipt.locator.is_none() {
                        receipt.locator = Some(locator);
                    }
                }
                Err(e) => {
                    warn!(provider = %provider, "put failed: {e:#}");
                    receipt.failures.push(ProviderFailure {
                        provider,
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        debug!(
            successful = receipt.successful,
            attempted = receipt.attempted,
            "fan-out put complete"
        );
        receipt
    }

    /// Fetch `locator`, trying providers in order until one answers.
    pub async fn get_first(&self, locator: &str) -> Result<Vec<u8>> {
        let mut errors = Vec::new();
        for p in &self.providers {
            match p.get(locator).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    debug!(provider = %p.name(), locator = %locator, "get failed, trying next: {e:#}");
                    errors.push(format!("{}: {e:#}", p.name()));
                }
            }
        }
        if errors.is_empty() {
            anyhow::bail!("no storage providers configured");
        }
        anyhow::bail!("all providers failed for {locator}: {}", errors.join("; "))
    }
}
