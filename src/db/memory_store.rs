use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::db::entities::{
    cascade, dependency_link, inactivity_rule, node, operation_log, CascadeId, LinkId, NodeId,
};
use crate::db::enums::NodeStatus;
use crate::db::store::{Store, StoreError};

/// `Store` kept entirely in process memory. Used by the standalone server
/// (topology seeded from a TOML file) and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: DashMap<NodeId, node::Model>,
    links: DashMap<LinkId, dependency_link::Model>,
    cascades: DashMap<CascadeId, cascade::Model>,
    rules: DashMap<NodeId, inactivity_rule::Model>, // one rule per node
    logs: Mutex<Vec<operation_log::Model>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn operation_logs(&self) -> Vec<operation_log::Model> {
        self.logs.lock().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_nodes(&self) -> Result<Vec<node::Model>, StoreError> {
        Ok(self.nodes.iter().map(|e| e.value().clone()).collect())
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<node::Model>, StoreError> {
        Ok(self.nodes.get(&id).map(|e| e.value().clone()))
    }

    async fn insert_node(&self, model: node::Model) -> Result<(), StoreError> {
        if self.nodes.contains_key(&model.id) {
            return Err(StoreError::Conflict(format!("node {} already exists", model.id)));
        }
        self.nodes.insert(model.id, model);
        Ok(())
    }

    async fn update_node_status(&self, id: NodeId, status: NodeStatus) -> Result<(), StoreError> {
        let mut entry = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("node {id}")))?;
        entry.status = status;
        entry.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn delete_nodes(&self, ids: &[NodeId]) -> Result<u64, StoreError> {
        Ok(ids.iter().filter(|id| self.nodes.remove(id).is_some()).count() as u64)
    }

    async fn list_links(&self) -> Result<Vec<dependency_link::Model>, StoreError> {
        Ok(self.links.iter().map(|e| e.value().clone()).collect())
    }

    async fn insert_link(&self, model: dependency_link::Model) -> Result<(), StoreError> {
        self.links.insert(model.id, model);
        Ok(())
    }

    async fn delete_links(&self, ids: &[LinkId]) -> Result<u64, StoreError> {
        Ok(ids.iter().filter(|id| self.links.remove(id).is_some()).count() as u64)
    }

    async fn insert_cascade(&self, model: cascade::Model) -> Result<(), StoreError> {
        self.cascades.insert(model.id, model);
        Ok(())
    }

    async fn update_cascade(&self, model: &cascade::Model) -> Result<(), StoreError> {
        match self.cascades.get_mut(&model.id) {
            Some(mut entry) => {
                *entry = model.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("cascade {}", model.id))),
        }
    }

    async fn get_cascade(&self, id: CascadeId) -> Result<Option<cascade::Model>, StoreError> {
        Ok(self.cascades.get(&id).map(|e| e.value().clone()))
    }

    async fn list_unfinished_cascades(&self) -> Result<Vec<cascade::Model>, StoreError> {
        Ok(self
            .cascades
            .iter()
            .filter(|e| !e.status.is_terminal())
            .map(|e| e.value().clone())
            .collect())
    }

    async fn append_operation_log(&self, entry: operation_log::Model) -> Result<(), StoreError> {
        self.logs.lock().await.push(entry);
        Ok(())
    }

    async fn list_enabled_inactivity_rules(&self) -> Result<Vec<inactivity_rule::Model>, StoreError> {
        Ok(self
            .rules
            .iter()
            .filter(|e| e.is_enabled)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_inactivity_rule(&self, node_id: NodeId) -> Result<Option<inactivity_rule::Model>, StoreError> {
        Ok(self.rules.get(&node_id).map(|e| e.value().clone()))
    }

    async fn upsert_inactivity_rule(&self, model: inactivity_rule::Model) -> Result<(), StoreError> {
        self.rules.insert(model.node_id, model);
        Ok(())
    }

    async fn delete_inactivity_rules(&self, node_ids: &[NodeId]) -> Result<u64, StoreError> {
        Ok(node_ids.iter().filter(|id| self.rules.remove(id).is_some()).count() as u64)
    }
}
