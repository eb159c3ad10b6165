//! Storage health checks

use anyhow::Result;
use opendal::Operator;

use crate::set::ProviderSet;

/// Verify an OpenDAL endpoint is reachable by listing the root
pub async fn check_health(op: &Operator) -> Result<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("storage health check failed: {e}"))
}

/// Number of providers in `set` that pass their reachability check.
pub async fn healthy_count(set: &ProviderSet) -> usize {
    let checks = set.providers().iter().map(|p| async move {
        match p.check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(provider = %p.name(), "health check failed: {e}");
                false
            }
        }
    });
    futures::future::join_all(checks)
        .await
        .into_iter()
        .filter(|ok| *ok)
        .count()
}
