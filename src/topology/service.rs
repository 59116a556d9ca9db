use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::graph::{DeletionSet, DependencyGraph, NodeRef};
use super::GraphError;
use crate::db::entities::{dependency_link, CascadeId, LinkId, NodeId};
use crate::db::operation_log_service::{
    LogEntry, OperationLogger, REASON_CASCADE_DELETE, SOURCE_TOPOLOGY,
};
use crate::db::store::{Store, StoreError};

/// The dependency graph backed by persisted links. Every mutation is
/// validated against the in-memory view, persisted, then applied, all under
/// the same write lock so concurrent inserts cannot jointly form a cycle.
pub struct GraphStore {
    store: Arc<dyn Store>,
    logger: OperationLogger,
    graph: RwLock<DependencyGraph>,
}

impl GraphStore {
    pub async fn load(store: Arc<dyn Store>, logger: OperationLogger) -> Result<Self, GraphError> {
        let links = store.list_links().await?;
        let graph = DependencyGraph::from_links(links);
        info!(link_count = graph.len(), "Dependency graph loaded.");
        Ok(Self {
            store,
            logger,
            graph: RwLock::new(graph),
        })
    }

    pub async fn add_link(
        &self,
        parent: NodeId,
        child: NodeId,
        is_structural: bool,
        is_shared: bool,
    ) -> Result<LinkId, GraphError> {
        let mut graph = self.graph.write().await;
        graph.validate_link(parent, child, is_structural)?;
        for id in [parent, child] {
            if self.store.get_node(id).await?.is_none() {
                return Err(GraphError::NodeNotFound(id));
            }
        }

        let link = dependency_link::Model {
            id: Uuid::new_v4(),
            parent_id: parent,
            child_id: child,
            is_structural,
            is_shared,
            created_at: chrono::Utc::now(),
        };
        let id = link.id;
        self.store.insert_link(link.clone()).await?;
        graph.insert(link)?;
        info!(link_id = %id, parent = %parent, child = %child, is_structural, is_shared, "Dependency link added.");
        Ok(id)
    }

    /// User-initiated removal; structural links are rejected.
    pub async fn remove_link(&self, id: LinkId) -> Result<(), GraphError> {
        let mut graph = self.graph.write().await;
        let link = graph.get(id).ok_or(GraphError::LinkNotFound(id))?;
        if link.is_structural {
            return Err(GraphError::StructuralLinkProtected(id));
        }
        self.store.delete_links(&[id]).await?;
        graph.remove_link(id, false)?;
        info!(link_id = %id, "Dependency link removed.");
        Ok(())
    }

    pub async fn upstream_of(&self, node: NodeId) -> Vec<NodeRef> {
        self.graph.read().await.upstream_of(node)
    }

    pub async fn downstream_of(&self, node: NodeId) -> Vec<NodeRef> {
        self.graph.read().await.downstream_of(node)
    }

    /// Shared access to the live graph, used to compute cascade plans. No
    /// mutation can start while the guard is held.
    pub async fn read(&self) -> RwLockReadGuard<'_, DependencyGraph> {
        self.graph.read().await
    }

    /// Deletes a node, its structural descendants, every link touching any of
    /// them and their inactivity rules. Writes a single
    /// `service-cascade-delete` operation log entry.
    ///
    /// `cascade_using` reports a cascade that still has work on a node; any
    /// hit rejects the whole deletion before anything is removed.
    pub async fn delete_node(
        &self,
        node: NodeId,
        cascade_using: impl Fn(NodeId) -> Option<CascadeId> + Send + Sync,
    ) -> Result<DeletionSet, GraphError> {
        let mut graph = self.graph.write().await;
        let root = self
            .store
            .get_node(node)
            .await?
            .ok_or(GraphError::NodeNotFound(node))?;

        let mut set = graph.deletion_set(node);

        // Nodes that name a deleted node as parent are contained by it even
        // when discovery never produced a structural link for them.
        let all_nodes = self.store.list_nodes().await?;
        let mut in_set: HashSet<NodeId> = set.nodes.iter().copied().collect();
        loop {
            let orphans: Vec<NodeId> = all_nodes
                .iter()
                .filter(|n| !in_set.contains(&n.id))
                .filter(|n| n.parent_id.is_some_and(|p| in_set.contains(&p)))
                .map(|n| n.id)
                .collect();
            if orphans.is_empty() {
                break;
            }
            for orphan in orphans {
                let extra = graph.deletion_set(orphan);
                for n in extra.nodes {
                    if in_set.insert(n) {
                        set.nodes.push(n);
                    }
                }
                for l in extra.links {
                    if !set.links.contains(&l) {
                        set.links.push(l);
                    }
                }
            }
        }

        if let Some((busy, cascade_id)) = set
            .nodes
            .iter()
            .find_map(|n| cascade_using(*n).map(|c| (*n, c)))
        {
            return Err(GraphError::NodeBusy { node_id: busy, cascade_id });
        }

        // The in-memory view follows the node rows; leftover link or rule
        // rows are reported as a partial delete.
        let removed_nodes = self.store.delete_nodes(&set.nodes).await?;
        graph.apply_deletion(&set);

        let cleanup = async {
            let links = self.store.delete_links(&set.links).await?;
            let rules = self.store.delete_inactivity_rules(&set.nodes).await?;
            Ok::<_, StoreError>((links, rules))
        };
        let (removed_links, removed_rules) = match cleanup.await {
            Ok(counts) => counts,
            Err(e) => {
                error!(node_id = %node, removed_nodes, error = %e, "Node deleted but its links or rules were not.");
                self.logger
                    .record(
                        LogEntry::error(
                            SOURCE_TOPOLOGY,
                            format!("Deleted '{}' but cleanup of its links and rules failed: {}", root.name, e),
                        )
                        .node(node)
                        .reason(REASON_CASCADE_DELETE)
                        .error_code(
                            "PARTIAL_DELETE",
                            serde_json::json!({
                                "removedNodes": removed_nodes,
                                "pendingLinks": set.links,
                                "nodeIds": set.nodes,
                            }),
                        ),
                    )
                    .await;
                return Err(e.into());
            }
        };

        if removed_links as usize != set.links.len() {
            warn!(expected = set.links.len(), removed = removed_links, "Link rows out of sync with graph.");
        }

        let dependents = set.nodes.len().saturating_sub(1);
        info!(
            node_id = %node,
            removed_nodes,
            removed_links,
            removed_rules,
            "Node deleted with its structural descendants."
        );
        self.logger
            .record(
                LogEntry::info(
                    SOURCE_TOPOLOGY,
                    format!(
                        "Deleted '{}' and {} contained resource(s); removed {} link(s)",
                        root.name, dependents, removed_links
                    ),
                )
                .node(node)
                .reason(REASON_CASCADE_DELETE)
                .error_code(
                    "NODE_DELETED",
                    serde_json::json!({
                        "removedNodes": removed_nodes,
                        "removedLinks": removed_links,
                        "removedRules": removed_rules,
                        "nodeIds": set.nodes,
                    }),
                ),
            )
            .await;

        Ok(set)
    }
}
