use serde::{Deserialize, Serialize};

/// Tunables for the coordinator runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bounded capacity of each agent mailbox.
    pub mailbox_capacity: usize,
    /// Upper bound on the reconfiguration drain wait.
    pub drain_timeout_ms: u64,
    /// Default hop budget for every message.
    pub max_hops: u32,
    /// Rolling window size of the performance monitor.
    pub perf_window: usize,
    /// Adaptive policy re-evaluates after this many routed messages.
    pub eval_interval: u64,
    /// Children per node when the hierarchy is filled breadth-first.
    pub branching_factor: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            drain_timeout_ms: 5_000,
            max_hops: 32,
            perf_window: 256,
            eval_interval: 64,
            branching_factor: 3,
        }
    }
}

impl CoordinatorConfig {
    /// Build from environment, falling back to defaults per key.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            mailbox_capacity: env_parse("LATTICE_MAILBOX_CAPACITY", d.mailbox_capacity),
            drain_timeout_ms: env_parse("LATTICE_DRAIN_TIMEOUT_MS", d.drain_timeout_ms),
            max_hops: env_parse("LATTICE_MAX_HOPS", d.max_hops),
            perf_window: env_parse("LATTICE_PERF_WINDOW", d.perf_window),
            eval_interval: env_parse("LATTICE_EVAL_INTERVAL", d.eval_interval),
            branching_factor: env_parse("LATTICE_BRANCHING_FACTOR", d.branching_factor),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
