//! Topology strategies: the communication graph shapes governing routing.
//!
//! Each concrete shape (mesh, star, ring, hierarchical) implements
//! [`TopologyStrategy`]; the manager owns exactly one boxed strategy at a
//! time behind a read/write lock and swaps it during reconfiguration.
//! `Adaptive` is a selection policy handled by the manager, never a
//! strategy of its own.

pub mod hierarchical;
pub mod manager;
pub mod mesh;
pub mod ring;
pub mod star;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::CoordinatorConfig;
use crate::message::FailureReason;
use crate::registry::{AgentInfo, TopologyRelations};
use crate::{LatticeError, Result};

pub use hierarchical::HierarchicalStrategy;
pub use mesh::MeshStrategy;
pub use ring::RingStrategy;
pub use star::StarStrategy;

/// Topology selector exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Hierarchical,
    Mesh,
    Star,
    Ring,
    Adaptive,
}

impl TopologyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyKind::Hierarchical => "hierarchical",
            TopologyKind::Mesh => "mesh",
            TopologyKind::Star => "star",
            TopologyKind::Ring => "ring",
            TopologyKind::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of the active shape, folded into `get_topology_info()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyHealth {
    pub status: HealthStatus,
    pub notes: Vec<String>,
}

impl TopologyHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            notes: Vec::new(),
        }
    }

    pub fn degraded(note: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            notes: vec![note.into()],
        }
    }
}

/// Shape metadata reported by `describe()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyDescriptor {
    pub kind: TopologyKind,
    pub agent_count: usize,
    pub link_count: usize,
}

/// Hop path toward a target: intermediate relays in order, target last.
pub type RoutePath = Vec<String>;

/// Result of a route computation; failures are message-level data,
/// never crate errors.
pub type RouteResult = std::result::Result<RoutePath, FailureReason>;

/// Broadcast plan: `(target, hops)` pairs for every reachable member.
pub type BroadcastPlan = std::result::Result<Vec<(String, u32)>, FailureReason>;

/// One communication graph shape.
///
/// Implementations keep their own routing table (adjacency, hub pointer,
/// ring order, parent/children maps) mirroring the registry's live set.
/// Membership hooks and `rebuild` run under the coordinator's write lock;
/// `route`/`broadcast_from` run under read guards.
pub trait TopologyStrategy: Send + Sync {
    fn kind(&self) -> TopologyKind;

    /// Compute the hop path from `from` to `to` (target last).
    fn route(&self, from: &str, to: &str) -> RouteResult;

    /// Per-target hop counts for a broadcast out of `from`.
    fn broadcast_from(&self, from: &str) -> BroadcastPlan;

    fn on_agent_added(&mut self, agent: &AgentInfo);

    fn on_agent_removed(&mut self, agent_id: &str);

    /// Rebuild the routing table from a live-agent snapshot. Failure must
    /// leave the strategy unused (the caller aborts the transition).
    fn rebuild(&mut self, agents: &[AgentInfo]) -> Result<()>;

    fn describe(&self) -> TopologyDescriptor;

    fn health(&self) -> TopologyHealth;

    /// Relationship fields to mirror back into the registry.
    fn relations(&self) -> HashMap<String, TopologyRelations> {
        HashMap::new()
    }

    /// Star-only: promote an agent to hub. Other shapes reject.
    fn designate_hub(&mut self, agent_id: &str) -> Result<()> {
        let _ = agent_id;
        Err(LatticeError::InvalidConfiguration(format!(
            "{} topology has no hub role",
            self.kind()
        )))
    }
}

/// Construct an empty strategy for a concrete kind.
pub fn strategy_for(kind: TopologyKind, config: &CoordinatorConfig) -> Result<Box<dyn TopologyStrategy>> {
    match kind {
        TopologyKind::Mesh => Ok(Box::new(MeshStrategy::new())),
        TopologyKind::Star => Ok(Box::new(StarStrategy::new())),
        TopologyKind::Ring => Ok(Box::new(RingStrategy::new())),
        TopologyKind::Hierarchical => {
            Ok(Box::new(HierarchicalStrategy::new(config.branching_factor)))
        }
        TopologyKind::Adaptive => Err(LatticeError::InvalidConfiguration(
            "adaptive is a selection policy, not a concrete topology".to_string(),
        )),
    }
}
