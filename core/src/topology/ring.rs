use std::collections::HashMap;

use tracing::info;

use crate::message::FailureReason;
use crate::registry::{AgentInfo, TopologyRelations};
use crate::Result;

use super::{
    BroadcastPlan, RouteResult, TopologyDescriptor, TopologyHealth, TopologyKind, TopologyStrategy,
};

/// Agents arranged in a cycle; messages walk neighbor links hop by hop.
///
/// Unicast takes the shorter direction around the ring (O(n) worst case);
/// broadcast walks the full ring once. Removing an agent relinks its two
/// neighbors directly, which is the critical repair keeping the cycle
/// closed. Suited to pipeline workloads, not low-latency fan-out.
#[derive(Debug, Default)]
pub struct RingStrategy {
    /// Cycle order (registration order).
    order: Vec<String>,
    next: HashMap<String, String>,
    prev: HashMap<String, String>,
}

impl RingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, agent_id: &str) -> Option<usize> {
        self.order.iter().position(|id| id == agent_id)
    }

    /// Relink the cycle from the current order.
    fn relink(&mut self) {
        self.next.clear();
        self.prev.clear();
        let n = self.order.len();
        if n == 0 {
            return;
        }
        for i in 0..n {
            let here = self.order[i].clone();
            let succ = self.order[(i + 1) % n].clone();
            self.prev.insert(succ.clone(), here.clone());
            self.next.insert(here, succ);
        }
    }

    /// Walk `steps` links in one direction, validating each pointer.
    fn walk(&self, from: &str, steps: usize, forward: bool) -> RouteResult {
        let links = if forward { &self.next } else { &self.prev };
        let mut path = Vec::with_capacity(steps);
        let mut here = from.to_string();
        for _ in 0..steps {
            match links.get(&here) {
                Some(succ) if self.next.contains_key(succ) => {
                    path.push(succ.clone());
                    here = succ.clone();
                }
                // Dangling or missing neighbor pointer.
                _ => return Err(FailureReason::RingBroken),
            }
        }
        Ok(path)
    }
}

impl TopologyStrategy for RingStrategy {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Ring
    }

    fn route(&self, from: &str, to: &str) -> RouteResult {
        let (i, j) = match (self.position(from), self.position(to)) {
            (Some(i), Some(j)) => (i, j),
            _ => return Err(FailureReason::UnknownAgent),
        };
        let n = self.order.len();
        let forward = (j + n - i) % n;
        let backward = n - forward;
        if forward <= backward {
            self.walk(from, forward, true)
        } else {
            self.walk(from, backward, false)
        }
    }

    fn broadcast_from(&self, from: &str) -> BroadcastPlan {
        if self.position(from).is_none() {
            return Err(FailureReason::UnknownAgent);
        }
        // One full lap along the next links.
        let lap = self.walk(from, self.order.len().saturating_sub(1), true)?;
        Ok(lap
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, (i + 1) as u32))
            .collect())
    }

    fn on_agent_added(&mut self, agent: &AgentInfo) {
        if self.position(&agent.agent_id).is_some() {
            return;
        }
        self.order.push(agent.agent_id.clone());
        self.relink();
    }

    fn on_agent_removed(&mut self, agent_id: &str) {
        let Some(pos) = self.position(agent_id) else {
            return;
        };
        self.order.remove(pos);
        // Join the two neighbors of the removed agent directly.
        self.relink();
        info!("Ring relinked around removed agent {}", agent_id);
    }

    fn rebuild(&mut self, agents: &[AgentInfo]) -> Result<()> {
        self.order = agents.iter().map(|a| a.agent_id.clone()).collect();
        self.relink();
        Ok(())
    }

    fn describe(&self) -> TopologyDescriptor {
        let n = self.order.len();
        TopologyDescriptor {
            kind: TopologyKind::Ring,
            agent_count: n,
            link_count: if n > 1 { n } else { 0 },
        }
    }

    fn health(&self) -> TopologyHealth {
        for id in &self.order {
            let intact = self
                .next
                .get(id)
                .is_some_and(|s| self.position(s).is_some())
                && self
                    .prev
                    .get(id)
                    .is_some_and(|p| self.position(p).is_some());
            if !intact {
                return TopologyHealth::degraded(format!("ring link broken at {id}"));
            }
        }
        TopologyHealth::healthy()
    }

    fn relations(&self) -> HashMap<String, TopologyRelations> {
        let mut out = HashMap::new();
        for id in &self.order {
            out.insert(
                id.clone(),
                TopologyRelations {
                    ring_next: self.next.get(id).cloned(),
                    ring_prev: self.prev.get(id).cloned(),
                    ..TopologyRelations::default()
                },
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn agent(id: &str, seq: u64) -> AgentInfo {
        AgentInfo {
            agent_id: id.to_string(),
            role: "worker".to_string(),
            capabilities: Vec::new(),
            metadata: StdHashMap::new(),
            state: crate::registry::AgentState::Active,
            seq,
            relations: TopologyRelations::default(),
        }
    }

    fn ring_of(ids: &[&str]) -> RingStrategy {
        let mut ring = RingStrategy::new();
        let agents: Vec<AgentInfo> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| agent(id, i as u64))
            .collect();
        ring.rebuild(&agents).unwrap();
        ring
    }

    #[test]
    fn picks_shorter_direction() {
        let ring = ring_of(&["a", "b", "c", "d", "e"]);
        // a -> b forward is 1 hop; a -> e backward is 1 hop.
        assert_eq!(ring.route("a", "b").unwrap(), vec!["b"]);
        assert_eq!(ring.route("a", "e").unwrap(), vec!["e"]);
        // a -> c forward: through b.
        assert_eq!(ring.route("a", "c").unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn removal_relinks_neighbors() {
        let mut ring = ring_of(&["a", "b", "c", "d"]);
        ring.on_agent_removed("b");
        assert_eq!(ring.next.get("a"), Some(&"c".to_string()));
        assert_eq!(ring.prev.get("c"), Some(&"a".to_string()));
        assert_eq!(ring.route("a", "c").unwrap(), vec!["c"]);
        assert_eq!(ring.health().status, crate::topology::HealthStatus::Healthy);
    }

    #[test]
    fn broken_link_is_detected_and_repairable() {
        let mut ring = ring_of(&["a", "b", "c"]);
        ring.next.remove("b");
        // Any walk that touches the dangling member trips the check.
        assert_eq!(ring.route("a", "b"), Err(FailureReason::RingBroken));
        assert_eq!(
            ring.health().status,
            crate::topology::HealthStatus::Degraded
        );

        let agents = vec![agent("a", 0), agent("b", 1), agent("c", 2)];
        ring.rebuild(&agents).unwrap();
        assert_eq!(ring.route("a", "b").unwrap(), vec!["b"]);
        assert_eq!(ring.health().status, crate::topology::HealthStatus::Healthy);
    }

    #[test]
    fn broadcast_walks_full_ring_once() {
        let ring = ring_of(&["a", "b", "c", "d"]);
        let plan = ring.broadcast_from("b").unwrap();
        assert_eq!(
            plan,
            vec![
                ("c".to_string(), 1),
                ("d".to_string(), 2),
                ("a".to_string(), 3)
            ]
        );
    }
}
