use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::plan::{self, PlanStep, StepRole};
use super::{CascadeError, CascadeLauncher};
use crate::connectors::{PowerController, ProviderError, ReachabilityProbe};
use crate::db::entities::{cascade, node, CascadeId, NodeId};
use crate::db::enums::{CascadeStatus, CascadeType, NodeStatus};
use crate::db::operation_log_service::{
    LogEntry, OperationLogger, REASON_RETAINED_DEPENDENT, REASON_SHARED_DEPENDENCY,
    SOURCE_CASCADE, SOURCE_CONNECTION_TEST,
};
use crate::db::store::Store;
use crate::lifecycle::check_transition;
use crate::server::event_broadcaster::EventBroadcaster;
use crate::topology::{DeletionSet, GraphError, GraphStore};

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Upper bound on one power-on/off call including its confirmation.
    pub step_timeout: Duration,
    pub probe_timeout: Duration,
}

/// Counts from [`CascadeOrchestrator::reconcile_interrupted`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub cascades_failed: usize,
    pub nodes_errored: usize,
}

#[derive(Clone, Copy)]
enum StepOutcome {
    Executed,
    AlreadyDone,
    Retained(&'static str),
}

struct StepReport {
    node_name: String,
    outcome: StepOutcome,
}

/// Runs start/stop cascades. Plans are computed when the request is
/// accepted, then executed step by step on a spawned task; callers get the
/// cascade id back immediately and follow progress through events.
///
/// At most one cascade targets a node at a time. Steps of different
/// cascades that touch the same node are serialized by a per-node lock.
#[derive(Clone)]
pub struct CascadeOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn Store>,
    graph: Arc<GraphStore>,
    power: Arc<dyn PowerController>,
    probe: Arc<dyn ReachabilityProbe>,
    events: EventBroadcaster,
    logger: OperationLogger,
    settings: OrchestratorSettings,
    active: DashMap<NodeId, CascadeId>,
    /// Nodes each accepted cascade may still touch.
    plans: DashMap<CascadeId, Vec<NodeId>>,
    node_locks: DashMap<NodeId, Arc<Mutex<()>>>,
}

impl CascadeOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        graph: Arc<GraphStore>,
        power: Arc<dyn PowerController>,
        probe: Arc<dyn ReachabilityProbe>,
        events: EventBroadcaster,
        logger: OperationLogger,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                graph,
                power,
                probe,
                events,
                logger,
                settings,
                active: DashMap::new(),
                plans: DashMap::new(),
                node_locks: DashMap::new(),
            }),
        }
    }

    pub async fn start_cascade(&self, node_id: NodeId) -> Result<CascadeId, CascadeError> {
        self.launch(node_id, CascadeType::Start).await.map(|(id, _)| id)
    }

    pub async fn stop_cascade(&self, node_id: NodeId) -> Result<CascadeId, CascadeError> {
        self.launch(node_id, CascadeType::Stop).await.map(|(id, _)| id)
    }

    pub async fn get_cascade(&self, id: CascadeId) -> Result<Option<cascade::Model>, CascadeError> {
        Ok(self.inner.store.get_cascade(id).await?)
    }

    pub fn active_cascade_for(&self, node_id: NodeId) -> Option<CascadeId> {
        self.inner.active.get(&node_id).map(|e| *e.value())
    }

    /// Any accepted cascade whose plan includes `node_id`, as target or not.
    pub fn cascade_using(&self, node_id: NodeId) -> Option<CascadeId> {
        self.inner
            .plans
            .iter()
            .find(|e| e.value().contains(&node_id))
            .map(|e| *e.key())
    }

    /// Deletes a node and everything it contains. Refused while any node in
    /// the deletion set is part of an accepted cascade.
    pub async fn delete_node(&self, node_id: NodeId) -> Result<DeletionSet, CascadeError> {
        let set = self
            .inner
            .graph
            .delete_node(node_id, |id| self.cascade_using(id))
            .await
            .inspect_err(|e| {
                if let GraphError::NodeBusy { node_id: busy, cascade_id } = e {
                    warn!(node_id = %node_id, busy_node_id = %busy, cascade_id = %cascade_id, "Node deletion refused; cascade in progress.");
                }
            })?;
        Ok(set)
    }

    /// Accepts a cascade and spawns its execution. The handle lets callers
    /// that need to (tests, shutdown) wait for the run to finish.
    pub(crate) async fn launch(
        &self,
        node_id: NodeId,
        cascade_type: CascadeType,
    ) -> Result<(CascadeId, JoinHandle<()>), CascadeError> {
        // Planning and registration happen under the graph read guard so a
        // concurrent deletion either sees this cascade or runs entirely first.
        let graph = self.inner.graph.read().await;
        let target = self
            .inner
            .store
            .get_node(node_id)
            .await?
            .ok_or(CascadeError::NodeNotFound(node_id))?;
        let steps = plan::plan(&graph, node_id, cascade_type);
        let cascade = cascade::Model::new(node_id, cascade_type, steps.len() as u32);
        let cascade_id = cascade.id;

        match self.inner.active.entry(node_id) {
            Entry::Occupied(existing) => {
                return Err(CascadeError::CascadeAlreadyActive {
                    node_id,
                    cascade_id: *existing.get(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(cascade_id);
            }
        }
        self.inner
            .plans
            .insert(cascade_id, steps.iter().map(|s| s.node_id).collect());
        drop(graph);

        if let Err(e) = self.inner.store.insert_cascade(cascade.clone()).await {
            self.release(node_id, cascade_id);
            return Err(e.into());
        }

        info!(
            cascade_id = %cascade_id,
            node_id = %node_id,
            node = %target.name,
            %cascade_type,
            total_steps = steps.len(),
            "Cascade accepted."
        );
        self.inner
            .logger
            .record(
                LogEntry::info(
                    SOURCE_CASCADE,
                    format!("{} cascade for '{}' accepted with {} step(s)", cascade_type, target.name, steps.len()),
                )
                .node(node_id)
                .cascade(cascade_id),
            )
            .await;

        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.run(cascade, steps).await;
        });
        Ok((cascade_id, handle))
    }

    fn release(&self, node_id: NodeId, cascade_id: CascadeId) {
        self.inner.plans.remove(&cascade_id);
        self.inner.active.remove_if(&node_id, |_, id| *id == cascade_id);
    }

    fn node_lock(&self, node_id: NodeId) -> Arc<Mutex<()>> {
        self.inner.node_locks.entry(node_id).or_default().clone()
    }

    /// Drops the lock entry unless another step holds or awaits it. Clones
    /// are only taken under the map's shard lock, so the count cannot grow
    /// while `remove_if` inspects it.
    fn prune_node_lock(&self, node_id: NodeId, lock: Arc<Mutex<()>>) {
        self.inner
            .node_locks
            .remove_if(&node_id, |_, held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);
    }

    async fn run(&self, mut cascade: cascade::Model, steps: Vec<PlanStep>) {
        cascade.status = CascadeStatus::InProgress;
        self.persist(&cascade).await;

        let mut retained: HashSet<NodeId> = HashSet::new();
        for (index, step) in steps.iter().enumerate() {
            let step_no = index as u32 + 1;
            cascade.step = step_no;
            cascade.current_node_id = Some(step.node_id);

            match self.run_step(&cascade, step, &retained).await {
                Ok(report) => {
                    if let StepOutcome::Retained(_) = report.outcome {
                        retained.insert(step.node_id);
                    }
                    self.persist(&cascade).await;
                    self.inner.events.cascade_progress(
                        cascade.id,
                        cascade.node_id,
                        step_no,
                        cascade.total_steps,
                        step.node_id,
                        &report.node_name,
                    );
                }
                Err(e) => {
                    self.fail(cascade, step_no, step.node_id, e).await;
                    return;
                }
            }
        }

        cascade.status = CascadeStatus::Completed;
        cascade.completed_at = Some(chrono::Utc::now());
        self.persist(&cascade).await;
        self.release(cascade.node_id, cascade.id);

        info!(cascade_id = %cascade.id, node_id = %cascade.node_id, steps = cascade.total_steps, "Cascade completed.");
        self.inner
            .logger
            .record(
                LogEntry::info(SOURCE_CASCADE, format!("{} cascade completed", cascade.cascade_type))
                    .node(cascade.node_id)
                    .cascade(cascade.id),
            )
            .await;
        self.inner.events.cascade_complete(cascade.id, cascade.node_id, true);
    }

    async fn fail(&self, mut cascade: cascade::Model, step_no: u32, step_node: NodeId, err: CascadeError) {
        let code = err.code();
        let message = err.to_string();
        let cause = match &err {
            CascadeError::StepFailed { cause_code, .. } => *cause_code,
            _ => code,
        };

        cascade.status = CascadeStatus::Failed;
        cascade.failed_step = Some(step_no);
        cascade.error_code = Some(code.to_string());
        cascade.error_message = Some(message.clone());
        cascade.completed_at = Some(chrono::Utc::now());
        self.persist(&cascade).await;
        self.release(cascade.node_id, cascade.id);

        error!(
            cascade_id = %cascade.id,
            node_id = %cascade.node_id,
            failed_node_id = %step_node,
            failed_step = step_no,
            code,
            cause,
            error = %message,
            "Cascade failed."
        );
        self.inner
            .logger
            .record(
                LogEntry::error(SOURCE_CASCADE, format!("{} cascade failed at step {}: {}", cascade.cascade_type, step_no, message))
                    .node(step_node)
                    .cascade(cascade.id)
                    .error_code(
                        code,
                        serde_json::json!({
                            "failedStep": step_no,
                            "targetNodeId": cascade.node_id,
                            "cause": cause,
                        }),
                    ),
            )
            .await;
        self.inner
            .events
            .cascade_error(cascade.id, cascade.node_id, step_no, code, message);
        self.inner.events.cascade_complete(cascade.id, cascade.node_id, false);
    }

    async fn persist(&self, cascade: &cascade::Model) {
        if let Err(e) = self.inner.store.update_cascade(cascade).await {
            error!(cascade_id = %cascade.id, error = %e, "Failed to persist cascade state.");
        }
    }

    async fn run_step(
        &self,
        cascade: &cascade::Model,
        step: &PlanStep,
        retained: &HashSet<NodeId>,
    ) -> Result<StepReport, CascadeError> {
        let lock = self.node_lock(step.node_id);
        let result = {
            let _guard = lock.lock().await;
            self.execute_step(cascade, step, retained).await
        };
        self.prune_node_lock(step.node_id, lock);
        result
    }

    async fn execute_step(
        &self,
        cascade: &cascade::Model,
        step: &PlanStep,
        retained: &HashSet<NodeId>,
    ) -> Result<StepReport, CascadeError> {
        let mut node = self
            .inner
            .store
            .get_node(step.node_id)
            .await?
            .ok_or(CascadeError::NodeNotFound(step.node_id))?;

        let outcome = match cascade.cascade_type {
            CascadeType::Start => self.start_node(&mut node).await?,
            CascadeType::Stop => {
                let reason = if step.role == StepRole::Dependency {
                    self.retention_reason(&node, retained).await?
                } else {
                    None
                };
                match reason {
                    Some(reason) => StepOutcome::Retained(reason),
                    None => self.stop_node(&mut node).await?,
                }
            }
        };

        let entry = match outcome {
            StepOutcome::Executed => LogEntry::info(
                SOURCE_CASCADE,
                format!("'{}' is now {}", node.name, node.status),
            ),
            StepOutcome::AlreadyDone => LogEntry::info(
                SOURCE_CASCADE,
                format!("'{}' already {}, skipped", node.name, node.status),
            ),
            StepOutcome::Retained(reason) => {
                info!(cascade_id = %cascade.id, node = %node.name, reason, "Dependency kept running.");
                LogEntry::info(SOURCE_CASCADE, format!("'{}' kept running", node.name)).reason(reason)
            }
        };
        self.inner
            .logger
            .record(entry.node(node.id).cascade(cascade.id))
            .await;

        Ok(StepReport {
            node_name: node.name,
            outcome,
        })
    }

    async fn start_node(&self, node: &mut node::Model) -> Result<StepOutcome, CascadeError> {
        if node.status == NodeStatus::Online {
            return Ok(StepOutcome::AlreadyDone);
        }
        self.transition(node, NodeStatus::Starting).await?;
        debug!(node = %node.name, "Powering on.");

        let power = self.inner.power.clone();
        let result = tokio::time::timeout(self.inner.settings.step_timeout, power.power_on(node)).await;
        match flatten_timeout(result, self.inner.settings.step_timeout) {
            Ok(()) => {
                self.transition(node, NodeStatus::Online).await?;
                Ok(StepOutcome::Executed)
            }
            Err(e) => Err(self.step_failed(node, NodeStatus::Error, e).await),
        }
    }

    async fn stop_node(&self, node: &mut node::Model) -> Result<StepOutcome, CascadeError> {
        if node.status == NodeStatus::Offline {
            return Ok(StepOutcome::AlreadyDone);
        }
        let previous = node.status;
        self.transition(node, NodeStatus::Stopping).await?;
        debug!(node = %node.name, "Powering off.");

        let power = self.inner.power.clone();
        let result = tokio::time::timeout(self.inner.settings.step_timeout, power.power_off(node)).await;
        match flatten_timeout(result, self.inner.settings.step_timeout) {
            Ok(()) => {
                self.transition(node, NodeStatus::Offline).await?;
                Ok(StepOutcome::Executed)
            }
            // An unconfirmed stop leaves the node where it was.
            Err(e) => {
                let revert = if previous == NodeStatus::Online {
                    NodeStatus::Online
                } else {
                    NodeStatus::Error
                };
                Err(self.step_failed(node, revert, e).await)
            }
        }
    }

    async fn step_failed(&self, node: &mut node::Model, to: NodeStatus, cause: ProviderError) -> CascadeError {
        if let Err(e) = self.transition(node, to).await {
            error!(node = %node.name, status = %to, error = %e, "Could not record status after failed step.");
        }
        CascadeError::StepFailed {
            node_id: node.id,
            node_name: node.name.clone(),
            cause_code: cause.code(),
            message: cause.to_string(),
        }
    }

    /// Why a dependency of a stopped node must stay up, if it must. Evaluated
    /// against live statuses when the step runs.
    async fn retention_reason(
        &self,
        node: &node::Model,
        retained: &HashSet<NodeId>,
    ) -> Result<Option<&'static str>, CascadeError> {
        let dependents = self.inner.graph.downstream_of(node.id).await;
        let mut shared = false;
        let mut active_dependent = false;
        for dependent in &dependents {
            if dependent.is_structural {
                continue;
            }
            if retained.contains(&dependent.node_id) {
                return Ok(Some(REASON_RETAINED_DEPENDENT));
            }
            shared |= dependent.is_shared;
            if let Some(d) = self.inner.store.get_node(dependent.node_id).await? {
                active_dependent |= d.status.is_active();
            }
        }
        Ok((shared && active_dependent).then_some(REASON_SHARED_DEPENDENCY))
    }

    async fn transition(&self, node: &mut node::Model, to: NodeStatus) -> Result<(), CascadeError> {
        let previous = node.status;
        check_transition(previous, to)?;
        self.inner.store.update_node_status(node.id, to).await?;
        node.status = to;
        debug!(node = %node.name, %previous, status = %to, "Node status changed.");
        self.inner.events.status_change(node.id, previous, to);
        Ok(())
    }

    /// Settles state left behind by a previous process: unfinished cascades
    /// are failed and nodes caught mid-transition are put in `error`.
    pub async fn reconcile_interrupted(&self) -> Result<ReconcileReport, CascadeError> {
        let mut report = ReconcileReport::default();

        for mut cascade in self.inner.store.list_unfinished_cascades().await? {
            if self.active_cascade_for(cascade.node_id) == Some(cascade.id) {
                continue;
            }
            cascade.status = CascadeStatus::Failed;
            cascade.error_code = Some("INTERRUPTED".into());
            cascade.error_message = Some("Interrupted by process restart".into());
            cascade.completed_at = Some(chrono::Utc::now());
            if cascade.step > 0 {
                cascade.failed_step = Some(cascade.step);
            }
            self.inner.store.update_cascade(&cascade).await?;
            self.inner
                .logger
                .record(
                    LogEntry::warn(SOURCE_CASCADE, "Cascade interrupted by restart")
                        .node(cascade.node_id)
                        .cascade(cascade.id)
                        .error_code("INTERRUPTED", serde_json::json!({ "step": cascade.step })),
                )
                .await;
            report.cascades_failed += 1;
        }

        for mut node in self.inner.store.list_nodes().await? {
            if !node.status.is_transitional() || self.inner.active.contains_key(&node.id) {
                continue;
            }
            let previous = node.status;
            self.transition(&mut node, NodeStatus::Error).await?;
            self.inner
                .logger
                .record(
                    LogEntry::warn(SOURCE_CASCADE, format!("'{}' was {} at restart", node.name, previous))
                        .node(node.id),
                )
                .await;
            report.nodes_errored += 1;
        }

        if report != ReconcileReport::default() {
            warn!(
                cascades_failed = report.cascades_failed,
                nodes_errored = report.nodes_errored,
                "Reconciled state interrupted by restart."
            );
        }
        Ok(report)
    }

    /// Probes the node once and records the result. Does not touch status.
    pub async fn test_connection(&self, node_id: NodeId) -> Result<bool, CascadeError> {
        let node = self
            .inner
            .store
            .get_node(node_id)
            .await?
            .ok_or(CascadeError::NodeNotFound(node_id))?;

        let Some(target) = node.probe_target() else {
            self.inner
                .logger
                .record(
                    LogEntry::warn(SOURCE_CONNECTION_TEST, format!("'{}' has no address to test", node.name))
                        .node(node_id)
                        .error_code("NO_ADDRESS", serde_json::Value::Null),
                )
                .await;
            return Ok(false);
        };

        let reachable = self
            .inner
            .probe
            .probe_reachable(&target, self.inner.settings.probe_timeout)
            .await;
        let entry = if reachable {
            LogEntry::info(SOURCE_CONNECTION_TEST, format!("'{}' reachable at {}", node.name, target))
        } else {
            LogEntry::warn(SOURCE_CONNECTION_TEST, format!("'{}' unreachable at {}", node.name, target))
                .error_code("UNREACHABLE", serde_json::json!({ "target": target }))
        };
        self.inner.logger.record(entry.node(node_id)).await;
        Ok(reachable)
    }
}

fn flatten_timeout(
    result: Result<Result<(), ProviderError>, tokio::time::error::Elapsed>,
    limit: Duration,
) -> Result<(), ProviderError> {
    result.unwrap_or(Err(ProviderError::Timeout(limit)))
}

#[async_trait]
impl CascadeLauncher for CascadeOrchestrator {
    async fn stop_cascade(&self, node_id: NodeId) -> Result<CascadeId, CascadeError> {
        CascadeOrchestrator::stop_cascade(self, node_id).await
    }

    fn has_active_cascade(&self, node_id: NodeId) -> bool {
        self.inner.active.contains_key(&node_id)
    }
}
