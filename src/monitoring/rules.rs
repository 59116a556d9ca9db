use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::runtime::MonitorRuntime;
use crate::db::entities::inactivity_rule::{self, MonitoringCriteria};
use crate::db::entities::{node, NodeId};
use crate::db::enums::NodeType;
use crate::db::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid monitoring criteria: {0}")]
    InvalidCriteria(String),
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("No inactivity rule for node {0}")]
    RuleNotFound(NodeId),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl RuleError {
    pub fn code(&self) -> &'static str {
        match self {
            RuleError::InvalidCriteria(_) => "INVALID_CRITERIA",
            RuleError::NodeNotFound(_) => "NODE_NOT_FOUND",
            RuleError::RuleNotFound(_) => "RULE_NOT_FOUND",
            RuleError::Store(_) => "STORAGE_ERROR",
        }
    }
}

/// Checks a rule against what the node can actually report.
pub fn validate(node: &node::Model, timeout_minutes: u32, c: &MonitoringCriteria) -> Result<(), RuleError> {
    let invalid = |msg: &str| Err(RuleError::InvalidCriteria(msg.to_string()));

    if timeout_minutes == 0 {
        return invalid("timeoutMinutes must be at least 1");
    }
    if !c.any_enabled() {
        return invalid("at least one criterion must be enabled");
    }
    if c.last_access && node.ip_address.is_none() {
        return invalid("lastAccess needs a node address");
    }
    if c.network_connections || c.cpu_ram_activity {
        if node.node_type == NodeType::Container {
            return invalid("networkConnections and cpuRamActivity are not available for containers");
        }
        if node.capabilities.ssh.is_none() {
            return invalid("networkConnections and cpuRamActivity need an SSH capability");
        }
    }
    if c.cpu_ram_activity {
        for (name, v) in [("cpuThreshold", c.cpu_threshold), ("ramThreshold", c.ram_threshold)] {
            if !(0.0..=100.0).contains(&v) {
                return Err(RuleError::InvalidCriteria(format!("{name} must be between 0 and 100")));
            }
        }
    }
    if c.network_traffic {
        let platform_managed = matches!(node.node_type, NodeType::Vm | NodeType::Lxc | NodeType::Container)
            && node.parent_id.is_some()
            && node.platform_ref.is_some();
        if !platform_managed {
            return invalid("networkTraffic needs a platform-managed VM, LXC or container");
        }
    }
    Ok(())
}

/// Inactivity rule CRUD. Any change drops the monitor's state for the node
/// so the new settings start from a clean count.
pub struct InactivityRuleService {
    store: Arc<dyn Store>,
    monitor: MonitorRuntime,
}

impl InactivityRuleService {
    pub fn new(store: Arc<dyn Store>, monitor: MonitorRuntime) -> Self {
        Self { store, monitor }
    }

    pub async fn get_rule(&self, node_id: NodeId) -> Result<Option<inactivity_rule::Model>, RuleError> {
        Ok(self.store.get_inactivity_rule(node_id).await?)
    }

    pub async fn upsert_rule(
        &self,
        node_id: NodeId,
        timeout_minutes: u32,
        is_enabled: bool,
        criteria: MonitoringCriteria,
    ) -> Result<inactivity_rule::Model, RuleError> {
        let node = self
            .store
            .get_node(node_id)
            .await?
            .ok_or(RuleError::NodeNotFound(node_id))?;
        validate(&node, timeout_minutes, &criteria)?;

        let now = chrono::Utc::now();
        let rule = match self.store.get_inactivity_rule(node_id).await? {
            Some(existing) => inactivity_rule::Model {
                timeout_minutes,
                is_enabled,
                monitoring_criteria: criteria,
                updated_at: now,
                ..existing
            },
            None => inactivity_rule::Model {
                id: Uuid::new_v4(),
                node_id,
                timeout_minutes,
                is_enabled,
                monitoring_criteria: criteria,
                created_at: now,
                updated_at: now,
            },
        };
        self.store.upsert_inactivity_rule(rule.clone()).await?;
        self.monitor.clear_node(node_id);
        info!(node = %node.name, timeout_minutes, is_enabled, "Inactivity rule saved.");
        Ok(rule)
    }

    pub async fn set_enabled(&self, node_id: NodeId, is_enabled: bool) -> Result<inactivity_rule::Model, RuleError> {
        let mut rule = self
            .store
            .get_inactivity_rule(node_id)
            .await?
            .ok_or(RuleError::RuleNotFound(node_id))?;
        rule.is_enabled = is_enabled;
        rule.updated_at = chrono::Utc::now();
        self.store.upsert_inactivity_rule(rule.clone()).await?;
        self.monitor.clear_node(node_id);
        info!(node_id = %node_id, is_enabled, "Inactivity rule toggled.");
        Ok(rule)
    }

    /// Returns whether a rule existed.
    pub async fn delete_rule(&self, node_id: NodeId) -> Result<bool, RuleError> {
        let removed = self.store.delete_inactivity_rules(&[node_id]).await?;
        self.monitor.clear_node(node_id);
        Ok(removed > 0)
    }
}
