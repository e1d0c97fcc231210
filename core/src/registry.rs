use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::message::{FailureReason, Message};
use crate::{LatticeError, Result};

/// Lifecycle state of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Registering,
    Active,
    Degraded,
    Unreachable,
    Removed,
}

impl AgentState {
    /// Live agents participate in routing and receive broadcasts.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            AgentState::Registering | AgentState::Active | AgentState::Degraded
        )
    }
}

/// Topology-specific relationship fields. Only the fields belonging to the
/// active topology are meaningful at any given time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyRelations {
    pub parent_id: Option<String>,
    pub layer: Option<u32>,
    pub hub_id: Option<String>,
    pub ring_next: Option<String>,
    pub ring_prev: Option<String>,
}

/// Agent descriptor with registration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub role: String,
    pub capabilities: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub state: AgentState,
    /// Registration order, used as the tie-break for topology placement.
    pub seq: u64,
    pub relations: TopologyRelations,
}

/// Receiver side of an agent's mailbox, returned on registration.
#[derive(Debug)]
pub struct AgentHandle {
    pub agent_id: String,
    inbox: mpsc::Receiver<Message>,
}

impl AgentHandle {
    /// Await the next delivered message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    /// Non-blocking poll of the mailbox.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.inbox.try_recv().ok()
    }
}

/// In-memory registry of agents and their mailboxes.
///
/// Source of truth for identity, metadata, lifecycle state and the
/// topology relationship fields. Reads are concurrent; structural writes
/// happen under the active-strategy write lock held by the coordinator.
#[derive(Debug)]
pub struct AgentRegistry {
    agents: DashMap<String, AgentInfo>,
    mailboxes: DashMap<String, mpsc::Sender<Message>>,
    seq: AtomicU64,
    mailbox_capacity: usize,
}

impl AgentRegistry {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            agents: DashMap::new(),
            mailboxes: DashMap::new(),
            seq: AtomicU64::new(0),
            mailbox_capacity,
        }
    }

    /// Register a new agent and hand back its mailbox receiver.
    ///
    /// The optional metadata keys `role`, `capabilities` (comma separated)
    /// and `parent` (hierarchical placement) are interpreted; everything
    /// else is carried opaquely.
    #[tracing::instrument(skip(self, metadata), fields(agent_id = %agent_id))]
    pub fn register(
        &self,
        agent_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<AgentHandle> {
        if self.agents.contains_key(agent_id) {
            return Err(LatticeError::DuplicateAgent(agent_id.to_string()));
        }

        let role = metadata
            .get("role")
            .cloned()
            .unwrap_or_else(|| "worker".to_string());
        let capabilities = metadata
            .get("capabilities")
            .map(|s| {
                s.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let info = AgentInfo {
            agent_id: agent_id.to_string(),
            role,
            capabilities,
            metadata,
            state: AgentState::Registering,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            relations: TopologyRelations::default(),
        };

        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        self.agents.insert(agent_id.to_string(), info);
        self.mailboxes.insert(agent_id.to_string(), tx);

        info!("Registered agent {}", agent_id);
        Ok(AgentHandle {
            agent_id: agent_id.to_string(),
            inbox: rx,
        })
    }

    /// Remove an agent. Messages already enqueued in its mailbox are not
    /// retracted; later routing attempts toward it fail at the hop check.
    pub fn unregister(&self, agent_id: &str) -> Result<AgentInfo> {
        let (_, mut info) = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| LatticeError::AgentNotFound(agent_id.to_string()))?;
        self.mailboxes.remove(agent_id);
        info.state = AgentState::Removed;
        info!("Unregistered agent {}", agent_id);
        Ok(info)
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentInfo> {
        self.agents.get(agent_id).map(|e| e.clone())
    }

    pub fn is_live(&self, agent_id: &str) -> bool {
        self.agents
            .get(agent_id)
            .map(|e| e.state.is_live())
            .unwrap_or(false)
    }

    /// Live agents in registration order.
    pub fn list_active(&self) -> Vec<AgentInfo> {
        let mut agents: Vec<AgentInfo> = self
            .agents
            .iter()
            .filter(|e| e.state.is_live())
            .map(|e| e.clone())
            .collect();
        agents.sort_by_key(|a| a.seq);
        agents
    }

    pub fn len_active(&self) -> usize {
        self.agents.iter().filter(|e| e.state.is_live()).count()
    }

    pub fn mark_state(&self, agent_id: &str, state: AgentState) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            debug!("Agent {} state {:?} -> {:?}", agent_id, entry.state, state);
            entry.state = state;
        }
    }

    /// Enqueue a message into an agent's mailbox.
    pub async fn deliver(
        &self,
        agent_id: &str,
        message: Message,
    ) -> std::result::Result<(), FailureReason> {
        let tx = match self.mailboxes.get(agent_id) {
            Some(entry) => entry.clone(),
            None => return Err(FailureReason::UnknownAgent),
        };
        if tx.send(message).await.is_err() {
            // Receiver dropped: the agent can no longer be reached.
            self.mark_state(agent_id, AgentState::Unreachable);
            return Err(FailureReason::MailboxClosed);
        }
        Ok(())
    }

    /// Overwrite the relationship fields from the active strategy's view.
    /// Agents the strategy does not know keep cleared relations.
    pub fn sync_relations(&self, relations: HashMap<String, TopologyRelations>) {
        for mut entry in self.agents.iter_mut() {
            let id = entry.key().clone();
            entry.relations = relations.get(&id).cloned().unwrap_or_default();
        }
    }
}
