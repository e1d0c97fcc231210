//! Topology manager: owns the active strategy and decides when to switch.
//!
//! The manager is a small state machine over the five topology kinds. A
//! concrete kind pins the shape until the caller asks again; `Adaptive`
//! re-evaluates agent-count bands and workload hints on every membership
//! change and periodically against performance output. Only one
//! reconfiguration runs at a time; requests arriving meanwhile are queued
//! and applied in order once the active transition finishes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::monitor::PerfSummary;
use crate::reconfig::ReconfigurationEngine;
use crate::registry::AgentRegistry;
use crate::{LatticeError, Result};

use super::{TopologyKind, TopologyStrategy};

/// Workload shape hint feeding the adaptive policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadProfile {
    #[default]
    Balanced,
    /// Sequential/pipeline dependencies: prefer the ring.
    Pipeline,
    /// Collaborative fan-out: prefer the mesh while small.
    FanOut,
}

/// What happened to a switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchOutcome {
    Switched(TopologyKind),
    /// Deferred behind the transition currently in flight.
    Queued(TopologyKind),
    Unchanged,
}

pub struct TopologyManager {
    active: Arc<RwLock<Box<dyn TopologyStrategy>>>,
    engine: Arc<ReconfigurationEngine>,
    /// Declared mode: a concrete kind pins it, `Adaptive` delegates.
    mode: Mutex<TopologyKind>,
    workload: Mutex<WorkloadProfile>,
    pending: Mutex<VecDeque<TopologyKind>>,
}

impl TopologyManager {
    pub fn new(
        active: Arc<RwLock<Box<dyn TopologyStrategy>>>,
        engine: Arc<ReconfigurationEngine>,
        initial_mode: TopologyKind,
    ) -> Self {
        Self {
            active,
            engine,
            mode: Mutex::new(initial_mode),
            workload: Mutex::new(WorkloadProfile::default()),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn mode(&self) -> TopologyKind {
        *self.mode.lock().unwrap()
    }

    pub fn set_mode(&self, mode: TopologyKind) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn workload(&self) -> WorkloadProfile {
        *self.workload.lock().unwrap()
    }

    pub fn set_workload(&self, profile: WorkloadProfile) {
        *self.workload.lock().unwrap() = profile;
    }

    pub async fn active_kind(&self) -> TopologyKind {
        self.active.read().await.kind()
    }

    /// Size band alone: up to 4 agents mesh, 5-9 star, 10+ hierarchical.
    pub fn band_for(agent_count: usize) -> TopologyKind {
        match agent_count {
            0..=4 => TopologyKind::Mesh,
            5..=9 => TopologyKind::Star,
            _ => TopologyKind::Hierarchical,
        }
    }

    /// Pick the concrete shape for the current swarm size and workload.
    ///
    /// Pipeline workloads take the ring while it stays small, fan-out
    /// workloads hold the mesh a little longer; otherwise the size band
    /// decides.
    pub fn target_for(agent_count: usize, workload: WorkloadProfile) -> TopologyKind {
        match workload {
            WorkloadProfile::Pipeline if (3..=8).contains(&agent_count) => TopologyKind::Ring,
            WorkloadProfile::FanOut if agent_count <= 5 => TopologyKind::Mesh,
            _ => Self::band_for(agent_count),
        }
    }

    /// Switch to a concrete kind, queueing behind an in-flight transition.
    pub async fn request_switch(
        &self,
        kind: TopologyKind,
        registry: &AgentRegistry,
    ) -> Result<SwitchOutcome> {
        if self.active_kind().await == kind {
            return Ok(SwitchOutcome::Unchanged);
        }
        match self.engine.transition(kind, registry).await {
            Ok(()) => {
                self.drain_pending(registry).await;
                Ok(SwitchOutcome::Switched(kind))
            }
            Err(LatticeError::TransitionInProgress) => {
                self.pending.lock().unwrap().push_back(kind);
                debug!("Transition in flight; queued switch to {}", kind);
                Ok(SwitchOutcome::Queued(kind))
            }
            Err(e) => Err(e),
        }
    }

    async fn drain_pending(&self, registry: &AgentRegistry) {
        loop {
            let next = self.pending.lock().unwrap().pop_front();
            let Some(kind) = next else { break };
            if self.active_kind().await == kind {
                continue;
            }
            if let Err(e) = self.engine.transition(kind, registry).await {
                warn!("Deferred switch to {} failed: {}", kind, e);
            }
        }
    }

    /// Re-run the adaptive policy; no-op while pinned to a concrete kind.
    pub async fn evaluate(&self, registry: &AgentRegistry) -> Result<Option<SwitchOutcome>> {
        self.evaluate_target(registry, Self::target_for(registry.len_active(), self.workload()))
            .await
    }

    /// Periodic re-evaluation against performance output. Workload hints
    /// are advisory: a window with a high failure rate falls back to the
    /// plain size band.
    pub async fn evaluate_with_perf(
        &self,
        registry: &AgentRegistry,
        summary: &PerfSummary,
    ) -> Result<Option<SwitchOutcome>> {
        let count = registry.len_active();
        let mut target = Self::target_for(count, self.workload());
        if summary.failure_rate > 0.25 && target != Self::band_for(count) {
            info!(
                "Failure rate {:.0}% overrides workload hint {}",
                summary.failure_rate * 100.0,
                target
            );
            target = Self::band_for(count);
        }
        self.evaluate_target(registry, target).await
    }

    async fn evaluate_target(
        &self,
        registry: &AgentRegistry,
        target: TopologyKind,
    ) -> Result<Option<SwitchOutcome>> {
        if self.mode() != TopologyKind::Adaptive {
            return Ok(None);
        }
        if self.active_kind().await == target {
            return Ok(None);
        }
        info!(
            "Adaptive policy: {} agents -> {}",
            registry.len_active(),
            target
        );
        self.request_switch(target, registry).await.map(Some)
    }
}
