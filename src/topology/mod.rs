//! Dependency graph store: the in-memory link view plus its persistence.
pub mod graph;
pub mod service;

pub use graph::{DeletionSet, DependencyGraph, NodeRef};
pub use service::GraphStore;

use crate::db::entities::{CascadeId, LinkId, NodeId};
use crate::db::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("A node cannot depend on itself ({0})")]
    SelfLink(NodeId),
    #[error("Link {parent} -> {child} already exists")]
    DuplicateLink { parent: NodeId, child: NodeId },
    #[error("Link {parent} -> {child} would create a dependency cycle")]
    CycleDetected { parent: NodeId, child: NodeId },
    #[error("Link not found: {0}")]
    LinkNotFound(LinkId),
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Structural link {0} can only be removed by deleting one of its nodes")]
    StructuralLinkProtected(LinkId),
    #[error("Node {node_id} is in use by active cascade {cascade_id}")]
    NodeBusy { node_id: NodeId, cascade_id: CascadeId },
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl GraphError {
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::SelfLink(_) => "SELF_LINK",
            GraphError::DuplicateLink { .. } => "DUPLICATE_LINK",
            GraphError::CycleDetected { .. } => "CYCLE_DETECTED",
            GraphError::LinkNotFound(_) => "LINK_NOT_FOUND",
            GraphError::NodeNotFound(_) => "NODE_NOT_FOUND",
            GraphError::StructuralLinkProtected(_) => "STRUCTURAL_LINK_PROTECTED",
            GraphError::NodeBusy { .. } => "CASCADE_ALREADY_ACTIVE",
            GraphError::Store(_) => "STORAGE_ERROR",
        }
    }
}
