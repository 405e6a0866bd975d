//! Orchestrator configuration loaded from environment variables.

use std::time::Duration;

use crate::messages::CommandKind;

/// Destination queue for each outbound command, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub grant_items: String,
    pub debit_gil: String,
    pub subtract_items: String,
}

impl Endpoints {
    /// Returns the destination a command kind is routed to.
    pub fn destination_for(&self, kind: CommandKind) -> &str {
        match kind {
            CommandKind::GrantItems => &self.grant_items,
            CommandKind::DebitGil => &self.debit_gil,
            CommandKind::SubtractItems => &self.subtract_items,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            grant_items: "queue:inventory-grant-items".to_string(),
            debit_gil: "queue:identity-debit-gil".to_string(),
            subtract_items: "queue:inventory-subtract-items".to_string(),
        }
    }
}

/// Redelivery policy applied by the ingress to transient failures.
///
/// The first delivery is followed by up to `retry_limit` redeliveries,
/// spaced `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_limit: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(retry_limit: u32, interval: Duration) -> Self {
        Self {
            retry_limit,
            interval,
        }
    }

    /// A policy that never redelivers.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total number of delivery attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.retry_limit + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Trading service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `GRANT_ITEMS_QUEUE_ADDRESS`, `DEBIT_GIL_QUEUE_ADDRESS`, `SUBTRACT_ITEMS_QUEUE_ADDRESS`
/// - `RETRY_ATTEMPTS` — redeliveries after the first attempt (default: `3`)
/// - `RETRY_INTERVAL_MS` — spacing between redeliveries (default: `5000`)
/// - `CONFLICT_RETRY_LIMIT` — reload-and-reapply attempts on version conflict (default: `5`)
/// - `WORKER_COUNT` — concurrent message consumers (default: `4`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingConfig {
    pub endpoints: Endpoints,
    pub retry: RetryPolicy,
    pub conflict_retry_limit: u32,
    pub worker_count: usize,
}

impl TradingConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());

        Self {
            endpoints: Endpoints {
                grant_items: lookup("GRANT_ITEMS_QUEUE_ADDRESS")
                    .unwrap_or(defaults.endpoints.grant_items),
                debit_gil: lookup("DEBIT_GIL_QUEUE_ADDRESS")
                    .unwrap_or(defaults.endpoints.debit_gil),
                subtract_items: lookup("SUBTRACT_ITEMS_QUEUE_ADDRESS")
                    .unwrap_or(defaults.endpoints.subtract_items),
            },
            retry: RetryPolicy {
                retry_limit: parsed("RETRY_ATTEMPTS")
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(defaults.retry.retry_limit),
                interval: parsed("RETRY_INTERVAL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.interval),
            },
            conflict_retry_limit: parsed("CONFLICT_RETRY_LIMIT")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.conflict_retry_limit),
            worker_count: parsed("WORKER_COUNT")
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.worker_count),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            retry: RetryPolicy::default(),
            conflict_retry_limit: 5,
            worker_count: 4,
        }
    }
}
