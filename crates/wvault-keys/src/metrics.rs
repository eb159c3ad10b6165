//! Prometheus counters for the session store

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

#[derive(Clone, Default)]
pub struct SessionMetrics {
    pub derivations: Counter,
    pub derivation_failures: Counter,
    pub coalesced_waits: Counter,
    pub expiries: Counter,
}

impl SessionMetrics {
    /// Register all counters on `registry` under the `wvault_` prefix.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "wvault_key_derivations",
            "Key derivations sent to the key-material endpoint",
            self.derivations.clone(),
        );
        registry.register(
            "wvault_key_derivation_failures",
            "Key derivations that failed and cleared the session",
            self.derivation_failures.clone(),
        );
        registry.register(
            "wvault_key_derivation_coalesced",
            "Callers that waited on another caller's in-flight derivation",
            self.coalesced_waits.clone(),
        );
        registry.register(
            "wvault_session_expiries",
            "Sessions found expired on access",
            self.expiries.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_registered_counters_encode() {
        let metrics = SessionMetrics::default();
        let mut registry = Registry::default();
        metrics.register(&mut registry);

        metrics.derivations.inc();
        metrics.expiries.inc();

        let mut body = String::new();
        encode(&mut body, &registry).unwrap();
        assert!(body.contains("wvault_key_derivations_total 1"));
        assert!(body.contains("wvault_session_expiries_total 1"));
        assert!(body.contains("wvault_key_derivation_failures_total 0"));
    }
}
