use std::collections::{HashMap, HashSet};

use crate::message::FailureReason;
use crate::registry::AgentInfo;
use crate::Result;

use super::{
    BroadcastPlan, RouteResult, TopologyDescriptor, TopologyHealth, TopologyKind, TopologyStrategy,
};

/// Full adjacency: every agent talks to every other agent directly.
///
/// Unicast is always one hop and broadcast is a flat fan-out, at the price
/// of O(n) adjacency updates on every membership change. Intended for small
/// swarms (a handful of agents).
#[derive(Debug, Default)]
pub struct MeshStrategy {
    /// Members in registration order, for deterministic fan-out.
    order: Vec<String>,
    adjacency: HashMap<String, HashSet<String>>,
}

impl MeshStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn contains(&self, agent_id: &str) -> bool {
        self.adjacency.contains_key(agent_id)
    }
}

impl TopologyStrategy for MeshStrategy {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Mesh
    }

    fn route(&self, from: &str, to: &str) -> RouteResult {
        if !self.contains(from) || !self.contains(to) {
            return Err(FailureReason::UnknownAgent);
        }
        Ok(vec![to.to_string()])
    }

    fn broadcast_from(&self, from: &str) -> BroadcastPlan {
        if !self.contains(from) {
            return Err(FailureReason::UnknownAgent);
        }
        Ok(self
            .order
            .iter()
            .filter(|id| id.as_str() != from)
            .map(|id| (id.clone(), 1))
            .collect())
    }

    fn on_agent_added(&mut self, agent: &AgentInfo) {
        let id = agent.agent_id.clone();
        if self.contains(&id) {
            return;
        }
        // Every existing member gains an edge to the newcomer.
        for (_, peers) in self.adjacency.iter_mut() {
            peers.insert(id.clone());
        }
        let peers: HashSet<String> = self.order.iter().cloned().collect();
        self.adjacency.insert(id.clone(), peers);
        self.order.push(id);
    }

    fn on_agent_removed(&mut self, agent_id: &str) {
        if self.adjacency.remove(agent_id).is_none() {
            return;
        }
        for (_, peers) in self.adjacency.iter_mut() {
            peers.remove(agent_id);
        }
        self.order.retain(|id| id != agent_id);
    }

    fn rebuild(&mut self, agents: &[AgentInfo]) -> Result<()> {
        self.order.clear();
        self.adjacency.clear();
        for agent in agents {
            self.on_agent_added(agent);
        }
        Ok(())
    }

    fn describe(&self) -> TopologyDescriptor {
        let n = self.order.len();
        TopologyDescriptor {
            kind: TopologyKind::Mesh,
            agent_count: n,
            link_count: n.saturating_sub(1) * n / 2,
        }
    }

    fn health(&self) -> TopologyHealth {
        TopologyHealth::healthy()
    }
}
