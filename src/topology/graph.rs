use std::collections::{HashMap, HashSet};

use crate::db::entities::{dependency_link, LinkId, NodeId};

use super::GraphError;

/// One end of a dependency edge as seen from the other end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub node_id: NodeId,
    pub link_id: LinkId,
    pub is_structural: bool,
    pub is_shared: bool,
}

/// Nodes and links removed by a node deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionSet {
    pub nodes: Vec<NodeId>,
    pub links: Vec<LinkId>,
}

/// In-memory adjacency view of the dependency links.
///
/// Adjacency lists keep insertion order so plans derived from the graph are
/// deterministic for a given link history.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    links: HashMap<LinkId, dependency_link::Model>,
    upstream: HashMap<NodeId, Vec<LinkId>>,   // child -> links to its parents
    downstream: HashMap<NodeId, Vec<LinkId>>, // parent -> links to its children
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from persisted rows, oldest first.
    pub fn from_links(mut links: Vec<dependency_link::Model>) -> Self {
        links.sort_by_key(|l| l.created_at);
        let mut graph = Self::new();
        for link in links {
            graph.insert_unchecked(link);
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn get(&self, id: LinkId) -> Option<&dependency_link::Model> {
        self.links.get(&id)
    }

    /// Checks an edge `parent -> child` against the insertion rules without
    /// mutating anything.
    pub fn validate_link(
        &self,
        parent: NodeId,
        child: NodeId,
        is_structural: bool,
    ) -> Result<(), GraphError> {
        if parent == child {
            return Err(GraphError::SelfLink(parent));
        }
        if self.find_link(parent, child).is_some() {
            return Err(GraphError::DuplicateLink { parent, child });
        }
        if !is_structural && self.reaches_functionally(child, parent) {
            return Err(GraphError::CycleDetected { parent, child });
        }
        Ok(())
    }

    /// Validates then inserts.
    pub fn insert(&mut self, link: dependency_link::Model) -> Result<(), GraphError> {
        self.validate_link(link.parent_id, link.child_id, link.is_structural)?;
        self.insert_unchecked(link);
        Ok(())
    }

    fn insert_unchecked(&mut self, link: dependency_link::Model) {
        self.upstream.entry(link.child_id).or_default().push(link.id);
        self.downstream.entry(link.parent_id).or_default().push(link.id);
        self.links.insert(link.id, link);
    }

    pub fn find_link(&self, parent: NodeId, child: NodeId) -> Option<&dependency_link::Model> {
        self.downstream
            .get(&parent)?
            .iter()
            .filter_map(|id| self.links.get(id))
            .find(|l| l.child_id == child)
    }

    /// Iterative DFS over functional edges: is `target` reachable from `from`?
    fn reaches_functionally(&self, from: NodeId, target: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for next in self.downstream_of(current) {
                if !next.is_structural && !visited.contains(&next.node_id) {
                    stack.push(next.node_id);
                }
            }
        }
        false
    }

    /// Nodes `node` directly depends on.
    pub fn upstream_of(&self, node: NodeId) -> Vec<NodeRef> {
        self.refs(self.upstream.get(&node), |l| l.parent_id)
    }

    /// Nodes that directly depend on `node`.
    pub fn downstream_of(&self, node: NodeId) -> Vec<NodeRef> {
        self.refs(self.downstream.get(&node), |l| l.child_id)
    }

    fn refs(
        &self,
        ids: Option<&Vec<LinkId>>,
        other_end: impl Fn(&dependency_link::Model) -> NodeId,
    ) -> Vec<NodeRef> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.links.get(id))
                .map(|l| NodeRef {
                    node_id: other_end(l),
                    link_id: l.id,
                    is_structural: l.is_structural,
                    is_shared: l.is_shared,
                })
                .collect()
        })
        .unwrap_or_default()
    }

    /// Removes a link. Structural links are only removable when
    /// `allow_structural` is set, which only entity deletion does.
    pub fn remove_link(
        &mut self,
        id: LinkId,
        allow_structural: bool,
    ) -> Result<dependency_link::Model, GraphError> {
        let link = self.links.get(&id).ok_or(GraphError::LinkNotFound(id))?;
        if link.is_structural && !allow_structural {
            return Err(GraphError::StructuralLinkProtected(id));
        }
        let link = self.links.remove(&id).ok_or(GraphError::LinkNotFound(id))?;
        if let Some(ids) = self.upstream.get_mut(&link.child_id) {
            ids.retain(|l| *l != id);
        }
        if let Some(ids) = self.downstream.get_mut(&link.parent_id) {
            ids.retain(|l| *l != id);
        }
        Ok(link)
    }

    /// Collects `node`, its structural descendants (recursively) and every link
    /// touching any of them, without mutating the graph.
    pub fn deletion_set(&self, node: NodeId) -> DeletionSet {
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            nodes.push(current);
            for child in self.downstream_of(current) {
                if child.is_structural && !seen.contains(&child.node_id) {
                    stack.push(child.node_id);
                }
            }
        }

        let mut links = Vec::new();
        let mut seen_links = HashSet::new();
        for n in &nodes {
            let touching = self
                .upstream
                .get(n)
                .into_iter()
                .chain(self.downstream.get(n))
                .flatten();
            for id in touching {
                if seen_links.insert(*id) {
                    links.push(*id);
                }
            }
        }
        DeletionSet { nodes, links }
    }

    /// Removes everything in `set` from the in-memory view.
    pub fn apply_deletion(&mut self, set: &DeletionSet) {
        for id in &set.links {
            // Entity deletion is the one path allowed to drop structural links.
            let _ = self.remove_link(*id, true);
        }
        for n in &set.nodes {
            self.upstream.remove(n);
            self.downstream.remove(n);
        }
    }
}
