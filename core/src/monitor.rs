// Performance monitoring for routing outcomes
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::topology::TopologyKind;

/// One observed delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub topology: TopologyKind,
    pub agent_count: usize,
    pub hops: u32,
    pub latency_ms: f64,
    pub delivered: bool,
    /// Milliseconds since epoch at observation time.
    pub at_ms: i64,
}

/// Observer notified of every routing outcome.
#[async_trait]
pub trait DeliveryObserver: Send + Sync {
    async fn on_delivery(&self, record: DeliveryRecord);
}

/// Aggregate over the rolling window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerfSummary {
    pub sampled_messages: usize,
    pub avg_latency_ms: f64,
    pub throughput_per_sec: f64,
    pub failure_rate: f64,
}

/// Window aggregate tagged with the topology it was measured under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfSample {
    pub topology: TopologyKind,
    pub agent_count: usize,
    pub message_count: usize,
    pub total_latency_ms: f64,
    pub throughput_per_sec: f64,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
}

/// Rolling window of delivery records feeding the switch heuristics.
pub struct PerformanceMonitor {
    window: RwLock<VecDeque<DeliveryRecord>>,
    capacity: usize,
    since_eval: AtomicU64,
}

impl PerformanceMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            since_eval: AtomicU64::new(0),
        }
    }

    pub async fn summary(&self) -> PerfSummary {
        let window = self.window.read().await;
        let n = window.len();
        if n == 0 {
            return PerfSummary::default();
        }
        let total_latency: f64 = window.iter().map(|r| r.latency_ms).sum();
        let failed = window.iter().filter(|r| !r.delivered).count();
        let span_ms = window
            .back()
            .zip(window.front())
            .map(|(last, first)| (last.at_ms - first.at_ms).max(0))
            .unwrap_or(0);
        let throughput = if span_ms > 0 {
            n as f64 / (span_ms as f64 / 1000.0)
        } else {
            0.0
        };
        PerfSummary {
            sampled_messages: n,
            avg_latency_ms: total_latency / n as f64,
            throughput_per_sec: throughput,
            failure_rate: failed as f64 / n as f64,
        }
    }

    /// Aggregate the current window into a sample, tagged with the most
    /// recent record's topology.
    pub async fn sample(&self) -> Option<PerfSample> {
        let window = self.window.read().await;
        let last = window.back()?;
        let first = window.front()?;
        let total_latency: f64 = window.iter().map(|r| r.latency_ms).sum();
        let span_ms = (last.at_ms - first.at_ms).max(0);
        Some(PerfSample {
            topology: last.topology,
            agent_count: last.agent_count,
            message_count: window.len(),
            total_latency_ms: total_latency,
            throughput_per_sec: if span_ms > 0 {
                window.len() as f64 / (span_ms as f64 / 1000.0)
            } else {
                0.0
            },
            window_start_ms: first.at_ms,
            window_end_ms: last.at_ms,
        })
    }

    /// True once `interval` deliveries accumulated since the last check.
    pub fn should_evaluate(&self, interval: u64) -> bool {
        if interval == 0 {
            return false;
        }
        if self.since_eval.load(Ordering::Relaxed) >= interval {
            self.since_eval.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }
}

#[async_trait]
impl DeliveryObserver for PerformanceMonitor {
    async fn on_delivery(&self, record: DeliveryRecord) {
        let mut window = self.window.write().await;
        if window.len() >= self.capacity {
            window.pop_front();
        }
        window.push_back(record);
        self.since_eval.fetch_add(1, Ordering::Relaxed);
    }
}
