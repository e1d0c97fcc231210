use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::message::FailureReason;
use crate::registry::{AgentInfo, TopologyRelations};
use crate::{LatticeError, Result};

use super::{
    BroadcastPlan, RouteResult, TopologyDescriptor, TopologyHealth, TopologyKind, TopologyStrategy,
};

/// Hub-and-spoke: all traffic between spokes relays through one hub.
///
/// Spoke-to-spoke unicast costs two hops; anything touching the hub costs
/// one. The hub is a structural single point of failure: losing it takes
/// cross-spoke routing down until a new hub is designated, and that outage
/// is surfaced through `health()` rather than papered over.
#[derive(Debug, Default)]
pub struct StarStrategy {
    /// Members in registration order.
    order: Vec<String>,
    members: HashSet<String>,
    hub: Option<String>,
}

impl StarStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub_id(&self) -> Option<&str> {
        self.hub.as_deref()
    }
}

impl TopologyStrategy for StarStrategy {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Star
    }

    fn route(&self, from: &str, to: &str) -> RouteResult {
        if !self.members.contains(from) || !self.members.contains(to) {
            return Err(FailureReason::UnknownAgent);
        }
        let hub = match self.hub_id() {
            Some(h) => h,
            None => return Err(FailureReason::HubUnreachable),
        };
        if from == hub || to == hub {
            // One of the endpoints is the hub itself: direct link.
            return Ok(vec![to.to_string()]);
        }
        Ok(vec![hub.to_string(), to.to_string()])
    }

    fn broadcast_from(&self, from: &str) -> BroadcastPlan {
        if !self.members.contains(from) {
            return Err(FailureReason::UnknownAgent);
        }
        let hub = match self.hub_id() {
            Some(h) => h,
            None => return Err(FailureReason::HubUnreachable),
        };
        let mut plan = Vec::with_capacity(self.order.len().saturating_sub(1));
        for id in &self.order {
            if id == from {
                continue;
            }
            let hops = if from == hub || id == hub { 1 } else { 2 };
            plan.push((id.clone(), hops));
        }
        Ok(plan)
    }

    fn on_agent_added(&mut self, agent: &AgentInfo) {
        let id = agent.agent_id.clone();
        if !self.members.insert(id.clone()) {
            return;
        }
        self.order.push(id.clone());
        // The founding member relays until a rebuild or an explicit
        // designation; later joins never steal the hub, and a lost hub
        // stays lost until a caller designates a replacement.
        if self.order.len() == 1 {
            self.hub = Some(id);
        }
    }

    fn on_agent_removed(&mut self, agent_id: &str) {
        if !self.members.remove(agent_id) {
            return;
        }
        self.order.retain(|id| id != agent_id);
        if self.hub_id() == Some(agent_id) {
            // No silent promotion: the outage stays visible until a caller
            // designates a replacement.
            self.hub = None;
            warn!("Star hub {} removed; cross-spoke routing down", agent_id);
        }
    }

    fn rebuild(&mut self, agents: &[AgentInfo]) -> Result<()> {
        self.order.clear();
        self.members.clear();
        self.hub = None;
        for agent in agents {
            self.on_agent_added(agent);
        }
        // Prefer an agent declared as hub; otherwise the newest member
        // relays and the longer-lived agents keep their worker roles.
        self.hub = agents
            .iter()
            .find(|a| a.role == "hub")
            .or_else(|| agents.last())
            .map(|a| a.agent_id.clone());
        Ok(())
    }

    fn describe(&self) -> TopologyDescriptor {
        let n = self.order.len();
        TopologyDescriptor {
            kind: TopologyKind::Star,
            agent_count: n,
            link_count: if self.hub.is_some() {
                n.saturating_sub(1)
            } else {
                0
            },
        }
    }

    fn health(&self) -> TopologyHealth {
        if self.hub.is_some() || self.order.is_empty() {
            TopologyHealth::healthy()
        } else {
            TopologyHealth::degraded("hub removed; cross-spoke routing unavailable")
        }
    }

    fn relations(&self) -> HashMap<String, TopologyRelations> {
        let mut out = HashMap::new();
        for id in &self.order {
            let hub_id = self.hub.clone().filter(|h| h != id);
            out.insert(
                id.clone(),
                TopologyRelations {
                    hub_id,
                    ..TopologyRelations::default()
                },
            );
        }
        out
    }

    fn designate_hub(&mut self, agent_id: &str) -> Result<()> {
        if !self.members.contains(agent_id) {
            return Err(LatticeError::AgentNotFound(agent_id.to_string()));
        }
        self.hub = Some(agent_id.to_string());
        Ok(())
    }
}
