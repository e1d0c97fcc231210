use std::collections::HashMap;

use tracing::{debug, info};

use crate::message::FailureReason;
use crate::registry::{AgentInfo, TopologyRelations};
use crate::{LatticeError, Result};

use super::{
    BroadcastPlan, RouteResult, TopologyDescriptor, TopologyHealth, TopologyKind, TopologyStrategy,
};

/// Tree of layers: every non-root agent has exactly one parent.
///
/// Routing climbs from the sender to the lowest common ancestor and walks
/// back down to the target, giving O(log n) hops on a balanced tree.
/// Placement honors an explicit `parent` metadata key and otherwise fills
/// the tree breadth-first in registration order, bounded by the configured
/// branching factor. Removing a non-leaf promotes its eldest child into
/// the vacated slot.
#[derive(Debug)]
pub struct HierarchicalStrategy {
    parent: HashMap<String, String>,
    /// Children in attach (registration) order.
    children: HashMap<String, Vec<String>>,
    layer: HashMap<String, u32>,
    /// Placement order, scanned for breadth-first attachment.
    placed: Vec<String>,
    root: Option<String>,
    branching: usize,
}

impl HierarchicalStrategy {
    pub fn new(branching: usize) -> Self {
        Self {
            parent: HashMap::new(),
            children: HashMap::new(),
            layer: HashMap::new(),
            placed: Vec::new(),
            root: None,
            branching: branching.max(1),
        }
    }

    fn contains(&self, agent_id: &str) -> bool {
        self.layer.contains_key(agent_id)
    }

    fn attach(&mut self, id: &str, parent_id: &str) {
        self.parent.insert(id.to_string(), parent_id.to_string());
        self.children
            .entry(parent_id.to_string())
            .or_default()
            .push(id.to_string());
        let depth = self.layer.get(parent_id).copied().unwrap_or(0) + 1;
        self.layer.insert(id.to_string(), depth);
        self.placed.push(id.to_string());
    }

    fn place(&mut self, agent: &AgentInfo) -> Result<()> {
        let id = agent.agent_id.as_str();
        if self.contains(id) {
            return Ok(());
        }
        if self.root.is_none() {
            self.root = Some(id.to_string());
            self.layer.insert(id.to_string(), 0);
            self.placed.push(id.to_string());
            return Ok(());
        }
        if let Some(wanted) = agent.metadata.get("parent") {
            if !self.contains(wanted) {
                return Err(LatticeError::InvalidConfiguration(format!(
                    "agent {} names unresolvable parent {}",
                    id, wanted
                )));
            }
            self.attach(id, &wanted.clone());
            return Ok(());
        }
        // Breadth-first fill: earliest-placed agent with a free slot.
        let parent_id = self
            .placed
            .iter()
            .find(|p| {
                self.children
                    .get(p.as_str())
                    .map(|c| c.len())
                    .unwrap_or(0)
                    < self.branching
            })
            .cloned()
            .expect("tree with a root always has a free slot");
        self.attach(id, &parent_id);
        Ok(())
    }

    /// Chain of ancestors starting at `id` (inclusive) up to the root.
    fn ancestors(&self, id: &str) -> Vec<String> {
        let mut chain = vec![id.to_string()];
        let mut here = id.to_string();
        while let Some(p) = self.parent.get(&here) {
            chain.push(p.clone());
            here = p.clone();
        }
        chain
    }

    fn distance(&self, a: &str, b: &str) -> Option<u32> {
        let up = self.ancestors(a);
        let rank: HashMap<&str, usize> = up.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        let mut down = 0u32;
        let mut here = b.to_string();
        loop {
            if let Some(&i) = rank.get(here.as_str()) {
                return Some(i as u32 + down);
            }
            here = self.parent.get(&here)?.clone();
            down += 1;
        }
    }

    /// Recompute every layer from the root after structural surgery.
    fn recompute_layers(&mut self) {
        self.layer.clear();
        let Some(root) = self.root.clone() else {
            return;
        };
        let mut queue = vec![(root, 0u32)];
        while let Some((id, depth)) = queue.pop() {
            self.layer.insert(id.clone(), depth);
            if let Some(kids) = self.children.get(&id) {
                for k in kids {
                    queue.push((k.clone(), depth + 1));
                }
            }
        }
    }
}

impl TopologyStrategy for HierarchicalStrategy {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Hierarchical
    }

    fn route(&self, from: &str, to: &str) -> RouteResult {
        if !self.contains(from) || !self.contains(to) {
            return Err(FailureReason::UnknownAgent);
        }
        let up = self.ancestors(from);
        let rank: HashMap<&str, usize> =
            up.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();

        // Climb from the target until we hit the sender's ancestor chain.
        let mut down_rev = Vec::new();
        let mut here = to.to_string();
        let lca_rank = loop {
            if let Some(&i) = rank.get(here.as_str()) {
                break i;
            }
            down_rev.push(here.clone());
            here = self
                .parent
                .get(&here)
                .cloned()
                .ok_or(FailureReason::UnknownAgent)?;
        };

        // Up through the LCA (excluded when the sender is its own LCA),
        // then down to the target.
        let mut path: Vec<String> = up[1..=lca_rank].to_vec();
        path.extend(down_rev.into_iter().rev());
        Ok(path)
    }

    fn broadcast_from(&self, from: &str) -> BroadcastPlan {
        if !self.contains(from) {
            return Err(FailureReason::UnknownAgent);
        }
        let mut plan = Vec::with_capacity(self.placed.len().saturating_sub(1));
        for id in &self.placed {
            if id == from {
                continue;
            }
            let hops = self.distance(from, id).ok_or(FailureReason::UnknownAgent)?;
            plan.push((id.clone(), hops));
        }
        Ok(plan)
    }

    fn on_agent_added(&mut self, agent: &AgentInfo) {
        // Placement of a single newcomer can only fail on a bad explicit
        // parent; fall back to breadth-first rather than lose the agent.
        if self.place(agent).is_err() {
            debug!(
                "Agent {} parent unresolvable, placing breadth-first",
                agent.agent_id
            );
            let mut fallback = agent.clone();
            fallback.metadata.remove("parent");
            let _ = self.place(&fallback);
        }
    }

    fn on_agent_removed(&mut self, agent_id: &str) {
        if !self.contains(agent_id) {
            return;
        }
        let orphans = self.children.remove(agent_id).unwrap_or_default();
        let grandparent = self.parent.remove(agent_id);

        if let Some(heir) = orphans.first().cloned() {
            // Promote the eldest child into the vacated slot; its former
            // siblings become its children.
            match &grandparent {
                Some(gp) => {
                    let slot = self.children.entry(gp.clone()).or_default();
                    if let Some(i) = slot.iter().position(|c| c == agent_id) {
                        slot[i] = heir.clone();
                    } else {
                        slot.push(heir.clone());
                    }
                    self.parent.insert(heir.clone(), gp.clone());
                }
                None => {
                    self.root = Some(heir.clone());
                    self.parent.remove(&heir);
                }
            }
            for sibling in orphans.iter().skip(1) {
                self.parent.insert(sibling.clone(), heir.clone());
                self.children
                    .entry(heir.clone())
                    .or_default()
                    .push(sibling.clone());
            }
            info!("Promoted {} into slot of removed {}", heir, agent_id);
        } else if let Some(gp) = &grandparent {
            if let Some(slot) = self.children.get_mut(gp) {
                slot.retain(|c| c != agent_id);
            }
        } else {
            self.root = None;
        }

        self.placed.retain(|id| id != agent_id);
        self.layer.remove(agent_id);
        self.recompute_layers();
    }

    fn rebuild(&mut self, agents: &[AgentInfo]) -> Result<()> {
        self.parent.clear();
        self.children.clear();
        self.layer.clear();
        self.placed.clear();
        self.root = None;
        for agent in agents {
            self.place(agent)?;
        }
        Ok(())
    }

    fn describe(&self) -> TopologyDescriptor {
        let n = self.placed.len();
        TopologyDescriptor {
            kind: TopologyKind::Hierarchical,
            agent_count: n,
            link_count: n.saturating_sub(1),
        }
    }

    fn health(&self) -> TopologyHealth {
        TopologyHealth::healthy()
    }

    fn relations(&self) -> HashMap<String, TopologyRelations> {
        let mut out = HashMap::new();
        for id in &self.placed {
            out.insert(
                id.clone(),
                TopologyRelations {
                    parent_id: self.parent.get(id).cloned(),
                    layer: self.layer.get(id).copied(),
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

    fn tree_of(n: usize, branching: usize) -> HierarchicalStrategy {
        let mut tree = HierarchicalStrategy::new(branching);
        let agents: Vec<AgentInfo> = (0..n)
            .map(|i| agent(&format!("agent-{i}"), i as u64))
            .collect();
        tree.rebuild(&agents).unwrap();
        tree
    }

    #[test]
    fn breadth_first_fill_keeps_layers_shallow() {
        let tree = tree_of(13, 3);
        // root + 3 + 9 fills layers 0..=2.
        assert_eq!(tree.layer["agent-0"], 0);
        assert_eq!(tree.layer["agent-3"], 1);
        assert_eq!(tree.layer["agent-4"], 2);
        assert_eq!(tree.layer["agent-12"], 2);
    }

    #[test]
    fn route_climbs_to_lca_and_down() {
        let tree = tree_of(13, 3);
        // Siblings under different layer-1 parents meet at the root.
        let path = tree.route("agent-4", "agent-7").unwrap();
        assert_eq!(path.last().map(String::as_str), Some("agent-7"));
        assert_eq!(path.len(), 4); // up 2 to root, down 2.

        // Parent to child is a single hop.
        assert_eq!(tree.route("agent-0", "agent-1").unwrap().len(), 1);

        // Descendant route never climbs past the LCA.
        let down = tree.route("agent-1", "agent-4").unwrap();
        assert_eq!(down, vec!["agent-4".to_string()]);
    }

    #[test]
    fn explicit_parent_is_honored_and_validated() {
        let mut tree = HierarchicalStrategy::new(3);
        let root = agent("root", 0);
        let mut child = agent("child", 1);
        child
            .metadata
            .insert("parent".to_string(), "root".to_string());
        tree.rebuild(&[root, child]).unwrap();
        assert_eq!(tree.parent["child"], "root");

        let mut bad = agent("stray", 2);
        bad.metadata
            .insert("parent".to_string(), "missing".to_string());
        let mut fresh = HierarchicalStrategy::new(3);
        let err = fresh.rebuild(&[agent("root", 0), bad]).unwrap_err();
        assert!(matches!(err, LatticeError::InvalidConfiguration(_)));
    }

    #[test]
    fn non_leaf_removal_promotes_eldest_child() {
        let mut tree = tree_of(13, 3);
        // agent-1 is a layer-1 parent of agents 4..=6.
        tree.on_agent_removed("agent-1");
        assert_eq!(tree.parent["agent-4"], "agent-0");
        assert_eq!(tree.parent["agent-5"], "agent-4");
        assert_eq!(tree.parent["agent-6"], "agent-4");
        assert!(tree.route("agent-5", "agent-12").is_ok());
        assert_eq!(tree.layer["agent-4"], 1);
    }

    #[test]
    fn root_removal_promotes_new_root() {
        let mut tree = tree_of(4, 3);
        tree.on_agent_removed("agent-0");
        assert_eq!(tree.root.as_deref(), Some("agent-1"));
        assert_eq!(tree.layer["agent-1"], 0);
        assert_eq!(tree.parent["agent-2"], "agent-1");
    }
}
