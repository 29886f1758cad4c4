//! Flow configuration
//!
//! Timing and retry policy for the update protocols: the auto-submit settle
//! delay, the post-update propagation delay, and the reconciliation backoff.
//! Loaded from the environment in production, with a fast `test_config()` for
//! the test suite.

use std::time::Duration;

use rand::Rng;

/// Backoff policy for the post-update reconciliation loop
///
/// The backend record becomes consistent only after the processor's write
/// propagates, so the loop re-fetches with bounded exponential backoff plus
/// jitter until the record appears or the wall-clock budget runs out.
#[derive(Debug, Clone)]
pub struct ReconcilePolicy {
    /// Delay before the first fetch attempt
    pub initial_delay: Duration,
    /// Maximum number of fetch attempts
    pub max_attempts: u32,
    /// Base interval between attempts; doubles each attempt
    pub base_interval: Duration,
    /// Cap on the interval between attempts
    pub max_interval: Duration,
    /// Total wall-clock budget across all attempts
    pub budget: Duration,
    /// Jitter fraction (0.0–1.0) applied to each interval
    pub jitter: f64,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1500),
            max_attempts: 5,
            base_interval: Duration::from_millis(1000),
            max_interval: Duration::from_secs(8),
            budget: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl ReconcilePolicy {
    /// Delay before retry number `attempt` (0-based), with jitter applied
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_interval
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_interval);
        if self.jitter <= 0.0 {
            return exp;
        }
        let spread = exp.as_millis() as f64 * self.jitter;
        let offset = rand::rng().random_range(-spread..=spread);
        let millis = (exp.as_millis() as f64 + offset).max(0.0) as u64;
        Duration::from_millis(millis)
    }
}

/// Configuration for the payment-method update flow
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Base URL of the backend payment API
    pub api_base: String,
    /// Settle delay before the background auto-submit chain starts
    pub settle_delay: Duration,
    /// Delay after a successful auto-submit before the success callback fires
    pub propagation_delay: Duration,
    /// Reconciliation retry policy
    pub reconcile: ReconcilePolicy,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            settle_delay: Duration::from_millis(400),
            propagation_delay: Duration::from_millis(2000),
            reconcile: ReconcilePolicy::default(),
        }
    }
}

impl FlowConfig {
    /// Build configuration from environment variables
    ///
    /// Recognized: `CARDFLOW_API_BASE`, `CARDFLOW_SETTLE_DELAY_MS`,
    /// `CARDFLOW_PROPAGATION_DELAY_MS`, `CARDFLOW_RECONCILE_MAX_ATTEMPTS`,
    /// `CARDFLOW_RECONCILE_BUDGET_SECS`. Unset or unparsable values fall back
    /// to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(fallback, Duration::from_millis)
        };
        Self {
            api_base: std::env::var("CARDFLOW_API_BASE").unwrap_or(defaults.api_base),
            settle_delay: millis("CARDFLOW_SETTLE_DELAY_MS", defaults.settle_delay),
            propagation_delay: millis("CARDFLOW_PROPAGATION_DELAY_MS", defaults.propagation_delay),
            reconcile: ReconcilePolicy {
                max_attempts: std::env::var("CARDFLOW_RECONCILE_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.reconcile.max_attempts),
                budget: std::env::var("CARDFLOW_RECONCILE_BUDGET_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map_or(defaults.reconcile.budget, Duration::from_secs),
                ..defaults.reconcile
            },
        }
    }

    /// Configuration with near-zero delays for tests
    pub fn test_config() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            settle_delay: Duration::from_millis(10),
            propagation_delay: Duration::from_millis(10),
            reconcile: ReconcilePolicy {
                initial_delay: Duration::from_millis(5),
                max_attempts: 3,
                base_interval: Duration::from_millis(5),
                max_interval: Duration::from_millis(20),
                budget: Duration::from_secs(5),
                jitter: 0.0,
            },
        }
    }
}
