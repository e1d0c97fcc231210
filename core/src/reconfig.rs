//! Reconfiguration engine: freeze, drain, rebuild, swap.
//!
//! Transitions are all-or-nothing from the caller's perspective. The
//! freeze point is the strategy write lock: sends already holding read
//! guards drain to completion or failure first, and later sends queue on
//! the lock rather than being rejected or dropped. The drain wait is
//! bounded; on expiry the transition aborts and the outgoing strategy
//! stays active.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::CoordinatorConfig;
use crate::registry::AgentRegistry;
use crate::topology::{strategy_for, TopologyKind, TopologyStrategy};
use crate::{LatticeError, Result};

pub struct ReconfigurationEngine {
    active: Arc<RwLock<Box<dyn TopologyStrategy>>>,
    busy: AtomicBool,
    config: CoordinatorConfig,
}

impl ReconfigurationEngine {
    pub fn new(
        active: Arc<RwLock<Box<dyn TopologyStrategy>>>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            active,
            busy: AtomicBool::new(false),
            config,
        }
    }

    /// Swap the active strategy for a freshly built one of `target` kind.
    ///
    /// Exactly one transition may run at a time; concurrent calls get
    /// `TransitionInProgress` and the manager queues them.
    pub async fn transition(&self, target: TopologyKind, registry: &AgentRegistry) -> Result<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(LatticeError::TransitionInProgress);
        }
        let result = self.run_transition(target, registry).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn run_transition(&self, target: TopologyKind, registry: &AgentRegistry) -> Result<()> {
        let drain = Duration::from_millis(self.config.drain_timeout_ms);

        // Freeze + drain: in-flight sends hold read guards and finish
        // before the write lock is granted.
        let mut guard = match timeout(drain, self.active.write()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Drain for switch to {} timed out; aborting", target);
                return Err(LatticeError::ReconfigTimedOut(self.config.drain_timeout_ms));
            }
        };

        let outgoing = guard.kind();
        let snapshot = registry.list_active();
        let mut incoming = strategy_for(target, &self.config)?;
        // A rebuild failure aborts the transition; the outgoing strategy
        // has not been touched.
        incoming.rebuild(&snapshot)?;

        *guard = incoming;
        registry.sync_relations(guard.relations());
        info!(
            "Topology switched {} -> {} ({} agents)",
            outgoing,
            target,
            snapshot.len()
        );
        Ok(())
    }

    /// Relink a broken ring from the current live snapshot.
    pub async fn repair_ring(&self, registry: &AgentRegistry) -> Result<()> {
        let mut guard = self.active.write().await;
        if guard.kind() != TopologyKind::Ring {
            return Ok(());
        }
        let snapshot = registry.list_active();
        guard.rebuild(&snapshot)?;
        registry.sync_relations(guard.relations());
        info!("Ring repaired from {} live agents", snapshot.len());
        Ok(())
    }
}
