//! Loads a topology description (nodes, links, inactivity rules) from TOML
//! into a fresh store. Nodes are referenced by name inside the file.
use std::collections::HashMap;
use std::fs;

use serde::Deserialize;
use tracing::info;

use crate::db::entities::inactivity_rule::MonitoringCriteria;
use crate::db::entities::node::{self, Capabilities};
use crate::db::entities::NodeId;
use crate::db::enums::NodeType;
use crate::db::store::{Store, StoreError};
use crate::monitoring::{InactivityRuleService, RuleError};
use crate::topology::{GraphError, GraphStore};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to read topology file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse topology file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Topology references unknown node '{0}'")]
    UnknownNode(String),
    #[error("Duplicate node name '{0}'")]
    DuplicateNode(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl SeedError {
    pub fn code(&self) -> &'static str {
        match self {
            SeedError::Read { .. } => "TOPOLOGY_READ",
            SeedError::Parse(_) => "TOPOLOGY_PARSE",
            SeedError::UnknownNode(_) => "NODE_NOT_FOUND",
            SeedError::DuplicateNode(_) => "DUPLICATE_NODE",
            SeedError::Graph(e) => e.code(),
            SeedError::Rule(e) => e.code(),
            SeedError::Store(_) => "STORAGE_ERROR",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyFile {
    #[serde(default)]
    pub nodes: Vec<NodeSeed>,
    #[serde(default)]
    pub links: Vec<LinkSeed>,
    #[serde(default)]
    pub rules: Vec<RuleSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSeed {
    pub name: String,
    pub node_type: NodeType,
    pub ip_address: Option<String>,
    /// Name of the structural container; a structural link is created.
    pub parent: Option<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub platform_ref: Option<String>,
    #[serde(default)]
    pub confirm_before_shutdown: bool,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSeed {
    /// The dependency.
    pub parent: String,
    /// The dependent.
    pub child: String,
    #[serde(default)]
    pub is_shared: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSeed {
    pub node: String,
    pub timeout_minutes: u32,
    #[serde(default = "enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub monitoring_criteria: MonitoringCriteria,
}

fn enabled() -> bool {
    true
}

pub fn read_topology(path: &str) -> Result<TopologyFile, SeedError> {
    let contents = fs::read_to_string(path).map_err(|source| SeedError::Read {
        path: path.to_string(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Inserts everything in `topology`. Links and rules go through the same
/// validation as runtime changes.
pub async fn apply_topology(
    topology: TopologyFile,
    store: &dyn Store,
    graph: &GraphStore,
    rules: &InactivityRuleService,
) -> Result<HashMap<String, NodeId>, SeedError> {
    let mut models = Vec::with_capacity(topology.nodes.len());
    let mut ids: HashMap<String, NodeId> = HashMap::new();
    for seed in &topology.nodes {
        let mut model = node::Model::new(seed.name.clone(), seed.node_type);
        model.ip_address = seed.ip_address.clone();
        model.capabilities = seed.capabilities.clone();
        model.platform_ref = seed.platform_ref.clone();
        model.confirm_before_shutdown = seed.confirm_before_shutdown;
        model.is_pinned = seed.is_pinned;
        if ids.insert(seed.name.clone(), model.id).is_some() {
            return Err(SeedError::DuplicateNode(seed.name.clone()));
        }
        models.push(model);
    }

    let lookup = |name: &str| ids.get(name).copied().ok_or_else(|| SeedError::UnknownNode(name.to_string()));

    let mut structural = Vec::new();
    for (seed, mut model) in topology.nodes.iter().zip(models) {
        if let Some(parent) = &seed.parent {
            let parent_id = lookup(parent)?;
            model.parent_id = Some(parent_id);
            structural.push((parent_id, model.id));
        }
        store.insert_node(model).await?;
    }
    for (parent_id, child_id) in structural {
        graph.add_link(parent_id, child_id, true, false).await?;
    }
    for link in &topology.links {
        graph
            .add_link(lookup(&link.parent)?, lookup(&link.child)?, false, link.is_shared)
            .await?;
    }
    for rule in topology.rules {
        let node_id = lookup(&rule.node)?;
        rules
            .upsert_rule(node_id, rule.timeout_minutes, rule.is_enabled, rule.monitoring_criteria)
            .await?;
    }

    info!(
        nodes = topology.nodes.len(),
        links = topology.links.len(),
        "Topology seeded."
    );
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::connectors::SignalProviders;
    use crate::db::memory_store::MemoryStore;
    use crate::db::operation_log_service::OperationLogger;
    use crate::monitoring::{MonitorRuntime, MonitorSettings};
    use crate::test_support::{CountingLauncher, ScriptedProbe};

    const TOPOLOGY: &str = r#"
        [[nodes]]
        name = "pve"
        nodeType = "physical"
        ipAddress = "10.0.0.2"
        capabilities = { platformApi = { kind = "proxmox", endpoint = "https://10.0.0.2:8006" } }

        [[nodes]]
        name = "media-vm"
        nodeType = "vm"
        ipAddress = "10.0.0.20"
        parent = "pve"
        platformRef = "101"

        [[nodes]]
        name = "nas"
        nodeType = "physical"
        ipAddress = "10.0.0.5"
        capabilities = { wol = { macAddress = "aa:bb:cc:dd:ee:ff" } }

        [[links]]
        parent = "nas"
        child = "media-vm"
        isShared = true

        [[rules]]
        node = "media-vm"
        timeoutMinutes = 30
    "#;

    async fn setup() -> (Arc<MemoryStore>, GraphStore, InactivityRuleService) {
        let store = Arc::new(MemoryStore::new());
        let logger = OperationLogger::new(store.clone());
        let graph = GraphStore::load(store.clone(), logger.clone()).await.unwrap();
        let monitor = MonitorRuntime::new(
            store.clone(),
            SignalProviders {
                probe: Arc::new(ScriptedProbe::always(true)),
                remote: None,
                traffic: None,
            },
            Arc::new(CountingLauncher::default()),
            logger,
            MonitorSettings {
                interval: Duration::from_secs(60),
                max_concurrency: 1,
                probe_timeout: Duration::from_millis(10),
                signal_timeout: Duration::from_millis(10),
            },
        );
        let rules = InactivityRuleService::new(store.clone(), monitor);
        (store, graph, rules)
    }

    #[tokio::test]
    async fn test_seed_builds_graph_and_rules() {
        let (store, graph, rules) = setup().await;
        let topology: TopologyFile = toml::from_str(TOPOLOGY).unwrap();

        let ids = apply_topology(topology, store.as_ref(), &graph, &rules).await.unwrap();

        let vm = ids["media-vm"];
        assert_eq!(store.get_node(vm).await.unwrap().unwrap().parent_id, Some(ids["pve"]));
        let upstream = graph.upstream_of(vm).await;
        assert_eq!(upstream.len(), 2);
        assert!(upstream.iter().any(|r| r.node_id == ids["pve"] && r.is_structural));
        assert!(upstream.iter().any(|r| r.node_id == ids["nas"] && r.is_shared));
        assert_eq!(rules.get_rule(vm).await.unwrap().unwrap().timeout_minutes, 30);
    }

    #[test]
    fn test_read_topology_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.toml");
        std::fs::write(&path, TOPOLOGY).unwrap();

        let topology = read_topology(path.to_str().unwrap()).unwrap();
        assert_eq!(topology.nodes.len(), 3);
        assert_eq!(topology.rules[0].monitoring_criteria, MonitoringCriteria::default());

        let missing = dir.path().join("missing.toml");
        let err = read_topology(missing.to_str().unwrap()).unwrap_err();
        assert_eq!(err.code(), "TOPOLOGY_READ");
    }

    #[tokio::test]
    async fn test_unknown_link_endpoint_is_rejected() {
        let (store, graph, rules) = setup().await;
        let topology: TopologyFile = toml::from_str(
            r#"
            [[nodes]]
            name = "a"
            nodeType = "vm"

            [[links]]
            parent = "a"
            child = "ghost"
            "#,
        )
        .unwrap();

        let err = apply_topology(topology, store.as_ref(), &graph, &rules).await.unwrap_err();
        assert!(matches!(err, SeedError::UnknownNode(name) if name == "ghost"));
    }
}
