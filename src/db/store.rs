//! Storage collaborator interface. The relational schema lives behind this
//! trait; the core only needs these row-level operations.
use async_trait::async_trait;

use crate::db::entities::{
    cascade, dependency_link, inactivity_rule, node, operation_log, CascadeId, LinkId, NodeId,
};
use crate::db::enums::NodeStatus;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<node::Model>, StoreError>;
    async fn get_node(&self, id: NodeId) -> Result<Option<node::Model>, StoreError>;
    async fn insert_node(&self, model: node::Model) -> Result<(), StoreError>;
    async fn update_node_status(&self, id: NodeId, status: NodeStatus) -> Result<(), StoreError>;
    /// Returns the number of rows removed.
    async fn delete_nodes(&self, ids: &[NodeId]) -> Result<u64, StoreError>;

    async fn list_links(&self) -> Result<Vec<dependency_link::Model>, StoreError>;
    async fn insert_link(&self, model: dependency_link::Model) -> Result<(), StoreError>;
    async fn delete_links(&self, ids: &[LinkId]) -> Result<u64, StoreError>;

    async fn insert_cascade(&self, model: cascade::Model) -> Result<(), StoreError>;
    async fn update_cascade(&self, model: &cascade::Model) -> Result<(), StoreError>;
    async fn get_cascade(&self, id: CascadeId) -> Result<Option<cascade::Model>, StoreError>;
    async fn list_unfinished_cascades(&self) -> Result<Vec<cascade::Model>, StoreError>;

    async fn append_operation_log(&self, entry: operation_log::Model) -> Result<(), StoreError>;

    async fn list_enabled_inactivity_rules(&self) -> Result<Vec<inactivity_rule::Model>, StoreError>;
    async fn get_inactivity_rule(&self, node_id: NodeId) -> Result<Option<inactivity_rule::Model>, StoreError>;
    async fn upsert_inactivity_rule(&self, model: inactivity_rule::Model) -> Result<(), StoreError>;
    async fn delete_inactivity_rules(&self, node_ids: &[NodeId]) -> Result<u64, StoreError>;
}
