//! Message router: the single entry point for `send` and `broadcast`.
//!
//! Routes are computed and walked under a read guard on the active
//! strategy, so sends admitted before a reconfiguration freeze complete
//! against the outgoing topology and later sends queue on the lock.
//! Delivery failures are returned as data; the router never retries on
//! behalf of the caller.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::message::{DeliveryOutcome, DeliveryResult, FailureReason, Message};
use crate::monitor::{DeliveryObserver, DeliveryRecord};
use crate::reconfig::ReconfigurationEngine;
use crate::registry::AgentRegistry;
use crate::topology::{TopologyKind, TopologyStrategy};

/// Router counters, exposed through `stats()`.
#[derive(Debug, Default)]
pub struct RouterStats {
    sent: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    relay_hops: AtomicU64,
    broadcasts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStatsSnapshot {
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub relay_hops: u64,
    pub broadcasts: u64,
}

impl RouterStats {
    fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            relay_hops: self.relay_hops.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
        }
    }
}

pub struct MessageRouter {
    registry: Arc<AgentRegistry>,
    active: Arc<RwLock<Box<dyn TopologyStrategy>>>,
    engine: Arc<ReconfigurationEngine>,
    observer: Arc<dyn DeliveryObserver>,
    stats: RouterStats,
    max_hops: u32,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<AgentRegistry>,
        active: Arc<RwLock<Box<dyn TopologyStrategy>>>,
        engine: Arc<ReconfigurationEngine>,
        observer: Arc<dyn DeliveryObserver>,
        max_hops: u32,
    ) -> Self {
        Self {
            registry,
            active,
            engine,
            observer,
            stats: RouterStats::default(),
            max_hops,
        }
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Route one message to one target along the active topology.
    pub async fn send(&self, from: &str, to: &str, payload: Vec<u8>) -> DeliveryResult {
        let started = Instant::now();
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        let mut message = Message::unicast(from, to, payload, self.max_hops);

        // Fail fast against the registry snapshot taken at call time.
        if !self.registry.is_live(from) || !self.registry.is_live(to) {
            let kind = self.active.read().await.kind();
            return self
                .finish(
                    DeliveryResult::failed(to, FailureReason::UnknownAgent, 0),
                    kind,
                    started,
                )
                .await;
        }

        // Self-sends bypass the topology: straight into the own mailbox.
        if from == to {
            let kind = self.active.read().await.kind();
            message.outcome = DeliveryOutcome::Delivered;
            let result = match self.registry.deliver(to, message.clone()).await {
                Ok(()) => DeliveryResult::delivered(to, 0),
                Err(reason) => DeliveryResult::failed(to, reason, 0),
            };
            return self.finish(result, kind, started).await;
        }

        let mut repaired = false;
        loop {
            let guard = self.active.read().await;
            let kind = guard.kind();
            match guard.route(from, to) {
                Ok(path) => {
                    let result = self.walk(&mut message, to, &path).await;
                    drop(guard);
                    return self.finish(result, kind, started).await;
                }
                Err(FailureReason::RingBroken) if !repaired => {
                    // Relink the ring and retry once before giving up.
                    drop(guard);
                    repaired = true;
                    warn!("Ring broken on route {} -> {}; repairing", from, to);
                    if self.engine.repair_ring(&self.registry).await.is_err() {
                        return self
                            .finish(
                                DeliveryResult::failed(to, FailureReason::RingBroken, 0),
                                kind,
                                started,
                            )
                            .await;
                    }
                }
                Err(reason) => {
                    drop(guard);
                    return self
                        .finish(DeliveryResult::failed(to, reason, 0), kind, started)
                        .await;
                }
            }
        }
    }

    /// Best-effort delivery to every live agent in the snapshot taken at
    /// call time; agents registered afterwards do not receive it.
    pub async fn broadcast(&self, from: &str, payload: Vec<u8>) -> Vec<DeliveryResult> {
        let started = Instant::now();
        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        let message = Message::broadcast(from, payload, self.max_hops);

        let snapshot: Vec<String> = self
            .registry
            .list_active()
            .into_iter()
            .map(|a| a.agent_id)
            .filter(|id| id != from)
            .collect();

        if !self.registry.is_live(from) {
            let kind = self.active.read().await.kind();
            return self
                .fail_all(&snapshot, FailureReason::UnknownAgent, kind, started)
                .await;
        }

        let guard = self.active.read().await;
        let kind = guard.kind();
        let plan = match guard.broadcast_from(from) {
            Ok(plan) => plan,
            Err(reason) => {
                drop(guard);
                return self.fail_all(&snapshot, reason, kind, started).await;
            }
        };

        let snapshot_set: HashSet<&str> = snapshot.iter().map(String::as_str).collect();
        let mut results = Vec::with_capacity(plan.len());
        for (target, hops) in plan {
            if !snapshot_set.contains(target.as_str()) {
                // Joined after the snapshot, or already gone.
                continue;
            }
            self.stats.sent.fetch_add(1, Ordering::Relaxed);
            let result = if hops > self.max_hops {
                DeliveryResult::failed(&target, FailureReason::HopBudgetExhausted, 0)
            } else if !self.registry.is_live(&target) {
                DeliveryResult::failed(&target, FailureReason::UnknownAgent, 0)
            } else {
                let mut copy = message.clone();
                copy.hops = hops;
                copy.outcome = DeliveryOutcome::Delivered;
                if hops > 1 {
                    self.stats
                        .relay_hops
                        .fetch_add(u64::from(hops) - 1, Ordering::Relaxed);
                }
                match self.registry.deliver(&target, copy).await {
                    Ok(()) => DeliveryResult::delivered(&target, hops),
                    Err(reason) => DeliveryResult::failed(&target, reason, hops),
                }
            };
            results.push(self.finish(result, kind, started).await);
        }
        drop(guard);
        results
    }

    async fn fail_all(
        &self,
        targets: &[String],
        reason: FailureReason,
        kind: TopologyKind,
        started: Instant,
    ) -> Vec<DeliveryResult> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            self.stats.sent.fetch_add(1, Ordering::Relaxed);
            results.push(
                self.finish(DeliveryResult::failed(target, reason, 0), kind, started)
                    .await,
            );
        }
        results
    }

    /// Walk a computed hop path, checking liveness at every relay and
    /// enqueueing at the final target. Hops past a failure are abandoned.
    async fn walk(&self, message: &mut Message, to: &str, path: &[String]) -> DeliveryResult {
        if path.len() as u32 > message.hop_budget {
            return DeliveryResult::failed(to, FailureReason::HopBudgetExhausted, 0);
        }
        let mut hops = 0u32;
        for (i, hop) in path.iter().enumerate() {
            if !self.registry.is_live(hop) {
                // Removed since the route was computed.
                debug!("Hop {} vanished on {} -> {}", hop, message.from, to);
                return DeliveryResult::failed(to, FailureReason::UnknownAgent, hops);
            }
            hops += 1;
            if i + 1 == path.len() {
                message.hops = hops;
                message.outcome = DeliveryOutcome::Delivered;
                if let Err(reason) = self.registry.deliver(hop, message.clone()).await {
                    return DeliveryResult::failed(to, reason, hops);
                }
            } else {
                self.stats.relay_hops.fetch_add(1, Ordering::Relaxed);
            }
        }
        DeliveryResult::delivered(to, hops)
    }

    async fn finish(
        &self,
        result: DeliveryResult,
        topology: TopologyKind,
        started: Instant,
    ) -> DeliveryResult {
        if result.is_delivered() {
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.observer
            .on_delivery(DeliveryRecord {
                topology,
                agent_count: self.registry.len_active(),
                hops: result.hops,
                latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                delivered: result.is_delivered(),
                at_ms: chrono::Utc::now().timestamp_millis(),
            })
            .await;
        result
    }
}
