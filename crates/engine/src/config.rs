//! Engine configuration.
//!
//! The engine is a library embedded by the app shell, so configuration is a
//! plain struct with sensible defaults rather than environment loading; the
//! embedding application owns its own config parsing and passes overrides
//! through struct update syntax.

use std::time::Duration;

use crate::resilience::RetryPolicy;

/// Tuning knobs for the cart engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry/backoff policy for remote calls.
    pub retry: RetryPolicy,
    /// Per-attempt timeout for mutations (add/remove/update/clear).
    pub mutation_timeout: Duration,
    /// Per-attempt timeout for reconciliation fetches.
    pub fetch_timeout: Duration,
    /// Interval between background revalidation passes.
    pub revalidate_interval: Duration,
    /// Maximum entries in the product resolution cache.
    pub product_cache_capacity: u64,
    /// How long resolved product data stays fresh.
    pub product_cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            mutation_timeout: Duration::from_secs(8),
            fetch_timeout: Duration::from_secs(15),
            revalidate_interval: Duration::from_secs(180),
            product_cache_capacity: 1000,
            product_cache_ttl: Duration::from_secs(300), // 5 minutes
        }
    }
}
