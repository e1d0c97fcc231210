// Lattice Core Library
// Topology-switching swarm coordinator runtime

pub mod config;
pub mod coordinator;
pub mod message;
pub mod monitor;
pub mod reconfig;
pub mod registry;
pub mod router;
pub mod telemetry;
pub mod topology;

// Export core types
pub use config::CoordinatorConfig;
pub use coordinator::{SwarmCoordinator, TopologyInfo};
pub use message::{DeliveryOutcome, DeliveryResult, FailureReason, Message, Recipients};
pub use monitor::{DeliveryObserver, DeliveryRecord, PerfSample, PerfSummary, PerformanceMonitor};
pub use registry::{AgentHandle, AgentInfo, AgentRegistry, AgentState};
pub use router::{MessageRouter, RouterStatsSnapshot};
pub use topology::manager::{SwitchOutcome, TopologyManager, WorkloadProfile};
pub use topology::{
    HealthStatus, TopologyDescriptor, TopologyHealth, TopologyKind, TopologyStrategy,
};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("duplicate agent: {0}")]
    DuplicateAgent(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("topology transition already in progress")]
    TransitionInProgress,

    #[error("invalid topology configuration: {0}")]
    InvalidConfiguration(String),

    #[error("reconfiguration drain timed out after {0} ms")]
    ReconfigTimedOut(u64),
}

pub type Result<T> = std::result::Result<T, LatticeError>;
