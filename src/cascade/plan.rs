use std::collections::HashSet;

use crate::db::entities::NodeId;
use crate::db::enums::CascadeType;
use crate::topology::DependencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRole {
    /// Something the target needs (start: brought up first; stop: torn down
    /// after the target unless still in use).
    Dependency,
    Target,
    /// Something that needs the target; stopped before it.
    Dependent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStep {
    pub node_id: NodeId,
    pub role: StepRole,
}

pub fn plan(graph: &DependencyGraph, target: NodeId, cascade_type: CascadeType) -> Vec<PlanStep> {
    match cascade_type {
        CascadeType::Start => start_plan(graph, target),
        CascadeType::Stop => stop_plan(graph, target),
    }
}

/// Dependency-first order over everything the target transitively needs,
/// structural containers included. Each node appears once.
pub fn start_plan(graph: &DependencyGraph, target: NodeId) -> Vec<PlanStep> {
    post_order(target, |n| graph.upstream_of(n).into_iter().map(|r| r.node_id).collect())
        .into_iter()
        .map(|node_id| PlanStep {
            node_id,
            role: if node_id == target { StepRole::Target } else { StepRole::Dependency },
        })
        .collect()
}

/// Dependents (structural children included) deepest-first, then the
/// target, then the target's functional dependencies, each before the
/// things it needs. Structural containers are never torn down by stopping
/// something they host.
pub fn stop_plan(graph: &DependencyGraph, target: NodeId) -> Vec<PlanStep> {
    let dependents = post_order(target, |n| {
        graph.downstream_of(n).into_iter().map(|r| r.node_id).collect()
    });
    let mut seen: HashSet<NodeId> = dependents.iter().copied().collect();

    let mut steps: Vec<PlanStep> = dependents
        .into_iter()
        .map(|node_id| PlanStep {
            node_id,
            role: if node_id == target { StepRole::Target } else { StepRole::Dependent },
        })
        .collect();

    let dependencies = post_order(target, |n| {
        graph
            .upstream_of(n)
            .into_iter()
            .filter(|r| !r.is_structural)
            .map(|r| r.node_id)
            .collect()
    });
    for node_id in dependencies.into_iter().rev() {
        if seen.insert(node_id) {
            steps.push(PlanStep { node_id, role: StepRole::Dependency });
        }
    }
    steps
}

/// Iterative depth-first post-order from `root`. The visited set keeps this
/// finite even if the edges handed in contain a cycle.
fn post_order(root: NodeId, neighbors: impl Fn(NodeId) -> Vec<NodeId>) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut finished = HashSet::new();
    let mut stack = vec![(root, false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            if finished.insert(node) {
                order.push(node);
            }
            continue;
        }
        if !visited.insert(node) {
            continue;
        }
        stack.push((node, true));
        for next in neighbors(node).into_iter().rev() {
            if !visited.contains(&next) {
                stack.push((next, false));
            }
        }
    }
    order
}
