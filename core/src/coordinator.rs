//! Swarm coordinator: the narrow API external collaborators consume.
//!
//! `SwarmCoordinator` wires the registry, the active topology strategy,
//! the router, the performance monitor and the reconfiguration engine
//! behind five operations: register, send, broadcast, switch-topology and
//! get-status. Callers need no topology-internal knowledge.
//!
//! # Examples
//!
//! ```no_run
//! use lattice_core::{CoordinatorConfig, SwarmCoordinator, TopologyKind};
//!
//! # async fn example() -> lattice_core::Result<()> {
//! let swarm = SwarmCoordinator::new(CoordinatorConfig::default(), TopologyKind::Adaptive)?;
//!
//! let mut alice = swarm.register_agent("alice", Default::default()).await?;
//! let _bob = swarm.register_agent("bob", Default::default()).await?;
//!
//! let result = swarm.send("bob", "alice", b"hello".to_vec()).await;
//! assert!(result.is_delivered());
//! assert!(alice.recv().await.is_some());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::CoordinatorConfig;
use crate::message::DeliveryResult;
use crate::monitor::{PerfSummary, PerformanceMonitor};
use crate::reconfig::ReconfigurationEngine;
use crate::registry::{AgentHandle, AgentRegistry, AgentState};
use crate::router::{MessageRouter, RouterStatsSnapshot};
use crate::topology::manager::{SwitchOutcome, TopologyManager, WorkloadProfile};
use crate::topology::{strategy_for, TopologyHealth, TopologyKind, TopologyStrategy};
use crate::Result;

/// Status snapshot returned by `get_topology_info()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyInfo {
    /// Shape currently routing messages.
    pub kind: TopologyKind,
    /// Declared mode; `Adaptive` when the manager picks the shape.
    pub mode: TopologyKind,
    pub agent_count: usize,
    /// Edges in the active routing table.
    pub links: usize,
    pub health: TopologyHealth,
    pub perf: PerfSummary,
    pub stats: RouterStatsSnapshot,
}

pub struct SwarmCoordinator {
    config: CoordinatorConfig,
    registry: Arc<AgentRegistry>,
    active: Arc<RwLock<Box<dyn TopologyStrategy>>>,
    manager: TopologyManager,
    router: MessageRouter,
    monitor: Arc<PerformanceMonitor>,
}

impl SwarmCoordinator {
    /// Build a coordinator starting on `initial` (Adaptive starts as the
    /// mesh, the smallest viable default).
    pub fn new(config: CoordinatorConfig, initial: TopologyKind) -> Result<Self> {
        let concrete = match initial {
            TopologyKind::Adaptive => TopologyKind::Mesh,
            kind => kind,
        };
        let active: Arc<RwLock<Box<dyn TopologyStrategy>>> =
            Arc::new(RwLock::new(strategy_for(concrete, &config)?));
        let registry = Arc::new(AgentRegistry::new(config.mailbox_capacity));
        let monitor = Arc::new(PerformanceMonitor::new(config.perf_window));
        let engine = Arc::new(ReconfigurationEngine::new(
            Arc::clone(&active),
            config.clone(),
        ));
        let manager = TopologyManager::new(Arc::clone(&active), Arc::clone(&engine), initial);
        let router = MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&active),
            engine,
            monitor.clone(),
            config.max_hops,
        );
        Ok(Self {
            config,
            registry,
            active,
            manager,
            router,
            monitor,
        })
    }

    /// Register an agent and hand back its mailbox handle.
    #[tracing::instrument(skip(self, metadata), fields(agent_id = %agent_id))]
    pub async fn register_agent(
        &self,
        agent_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<AgentHandle> {
        let handle = self.registry.register(agent_id, metadata)?;
        {
            let mut guard = self.active.write().await;
            if let Some(info) = self.registry.get(agent_id) {
                guard.on_agent_added(&info);
            }
            self.registry.mark_state(agent_id, AgentState::Active);
            self.registry.sync_relations(guard.relations());
        }
        if let Err(e) = self.manager.evaluate(&self.registry).await {
            warn!("Adaptive evaluation after register failed: {}", e);
        }
        Ok(handle)
    }

    /// Remove an agent. Messages already in its mailbox stay there;
    /// future routes through it fail at the hop check.
    #[tracing::instrument(skip(self), fields(agent_id = %agent_id))]
    pub async fn unregister_agent(&self, agent_id: &str) -> Result<()> {
        self.registry.unregister(agent_id)?;
        {
            let mut guard = self.active.write().await;
            guard.on_agent_removed(agent_id);
            self.registry.sync_relations(guard.relations());
        }
        if let Err(e) = self.manager.evaluate(&self.registry).await {
            warn!("Adaptive evaluation after unregister failed: {}", e);
        }
        Ok(())
    }

    /// Route one message along the active topology.
    pub async fn send(&self, from: &str, to: &str, payload: Vec<u8>) -> DeliveryResult {
        let result = self.router.send(from, to, payload).await;
        self.maybe_reevaluate().await;
        result
    }

    /// Best-effort delivery to every live agent except the sender.
    pub async fn broadcast(&self, from: &str, payload: Vec<u8>) -> Vec<DeliveryResult> {
        let results = self.router.broadcast(from, payload).await;
        self.maybe_reevaluate().await;
        results
    }

    /// Switch the topology. Concrete kinds pin the shape; `Adaptive`
    /// re-enables automatic selection. A request racing an in-flight
    /// transition is queued, not interleaved.
    pub async fn switch_topology(&self, kind: TopologyKind) -> Result<SwitchOutcome> {
        let previous = self.manager.mode();
        self.manager.set_mode(kind);
        let result = match kind {
            TopologyKind::Adaptive => self
                .manager
                .evaluate(&self.registry)
                .await
                .map(|outcome| outcome.unwrap_or(SwitchOutcome::Unchanged)),
            concrete => self.manager.request_switch(concrete, &self.registry).await,
        };
        if result.is_err() {
            // A failed transition leaves the outgoing strategy active;
            // the declared mode must not drift from it.
            self.manager.set_mode(previous);
        }
        result
    }

    /// Current shape, population, health and performance.
    pub async fn get_topology_info(&self) -> TopologyInfo {
        let (descriptor, health) = {
            let guard = self.active.read().await;
            (guard.describe(), guard.health())
        };
        TopologyInfo {
            kind: descriptor.kind,
            mode: self.manager.mode(),
            agent_count: self.registry.len_active(),
            links: descriptor.link_count,
            health,
            perf: self.monitor.summary().await,
            stats: self.router.stats(),
        }
    }

    /// Star only: promote a live agent to hub, clearing the outage left
    /// by a removed hub.
    pub async fn designate_hub(&self, agent_id: &str) -> Result<()> {
        if !self.registry.is_live(agent_id) {
            return Err(crate::LatticeError::AgentNotFound(agent_id.to_string()));
        }
        let mut guard = self.active.write().await;
        guard.designate_hub(agent_id)?;
        self.registry.sync_relations(guard.relations());
        Ok(())
    }

    /// Hint the adaptive policy about the workload shape.
    pub async fn set_workload_profile(&self, profile: WorkloadProfile) {
        self.manager.set_workload(profile);
        if let Err(e) = self.manager.evaluate(&self.registry).await {
            warn!("Adaptive evaluation after workload hint failed: {}", e);
        }
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.router.stats()
    }

    async fn maybe_reevaluate(&self) {
        if self.monitor.should_evaluate(self.config.eval_interval) {
            let summary = self.monitor.summary().await;
            if let Err(e) = self
                .manager
                .evaluate_with_perf(&self.registry, &summary)
                .await
            {
                warn!("Periodic adaptive evaluation failed: {}", e);
            }
        }
    }
}
