//! Dependency-aware start/stop sequencing.
pub mod orchestrator;
pub mod plan;

use async_trait::async_trait;

use crate::db::entities::{CascadeId, NodeId};
use crate::db::store::StoreError;
use crate::lifecycle::TransitionError;
use crate::topology::GraphError;

pub use orchestrator::{CascadeOrchestrator, OrchestratorSettings};
pub use plan::{PlanStep, StepRole};

#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Node {node_id} already has an active cascade ({cascade_id})")]
    CascadeAlreadyActive { node_id: NodeId, cascade_id: CascadeId },
    #[error("Step failed on '{node_name}': {message}")]
    StepFailed {
        node_id: NodeId,
        node_name: String,
        /// Code of the underlying provider failure, e.g. `TIMEOUT`.
        cause_code: &'static str,
        message: String,
    },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl CascadeError {
    pub fn code(&self) -> &'static str {
        match self {
            CascadeError::NodeNotFound(_) => "NODE_NOT_FOUND",
            CascadeError::CascadeAlreadyActive { .. } => "CASCADE_ALREADY_ACTIVE",
            CascadeError::StepFailed { .. } => "STEP_FAILED",
            CascadeError::Transition(_) => "INVALID_TRANSITION",
            CascadeError::Graph(e) => e.code(),
            CascadeError::Store(_) => "STORAGE_ERROR",
        }
    }
}

/// What the inactivity monitor needs from the orchestrator.
#[async_trait]
pub trait CascadeLauncher: Send + Sync {
    async fn stop_cascade(&self, node_id: NodeId) -> Result<CascadeId, CascadeError>;

    /// Whether a pending or running cascade targets `node_id`.
    fn has_active_cascade(&self, node_id: NodeId) -> bool;
}
