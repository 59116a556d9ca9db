use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::criteria::{self, Criterion, SignalOutcome};
use crate::cascade::CascadeLauncher;
use crate::connectors::SignalProviders;
use crate::db::entities::inactivity_rule::{self, MonitoringCriteria};
use crate::db::entities::{node, NodeId};
use crate::db::enums::NodeStatus;
use crate::db::operation_log_service::{
    LogEntry, OperationLogger, REASON_AUTO_SHUTDOWN, SOURCE_INACTIVITY,
};
use crate::db::store::Store;

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub max_concurrency: usize,
    pub probe_timeout: Duration,
    pub signal_timeout: Duration,
}

/// Per-node inactivity bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InactivityState {
    pub consecutive_inactive: u32,
    /// Start of the current inactive stretch: the last active tick, or one
    /// interval before the first inactive tick when none was seen.
    pub inactive_since: Option<DateTime<Utc>>,
}

/// What one tick did with one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeVerdict {
    Skipped,
    Evaluated(SignalOutcome),
    ShutdownTriggered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub evaluated: usize,
    pub skipped: usize,
    pub triggered: Vec<NodeId>,
}

struct MonitorTask {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owns everything the inactivity monitor keeps between ticks: the
/// inactivity counters, the traffic baselines and the scheduling task.
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MonitorRuntime {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn Store>,
    providers: SignalProviders,
    launcher: Arc<dyn CascadeLauncher>,
    logger: OperationLogger,
    settings: MonitorSettings,
    counters: DashMap<NodeId, InactivityState>,
    traffic: DashMap<NodeId, u64>,
    task: Mutex<Option<MonitorTask>>,
}

impl MonitorRuntime {
    pub fn new(
        store: Arc<dyn Store>,
        providers: SignalProviders,
        launcher: Arc<dyn CascadeLauncher>,
        logger: OperationLogger,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                providers,
                launcher,
                logger,
                settings,
                counters: DashMap::new(),
                traffic: DashMap::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Spawns the tick loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut task = self.inner.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let this = self.clone();
        let interval = self.inner.settings.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; evaluate one interval in.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let summary = this.run_tick(Utc::now()).await;
                        debug!(
                            evaluated = summary.evaluated,
                            skipped = summary.skipped,
                            triggered = summary.triggered.len(),
                            "Inactivity tick finished."
                        );
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("Inactivity monitor loop exited.");
        });

        *task = Some(MonitorTask { handle, shutdown_tx });
        info!(interval_secs = interval.as_secs(), "Inactivity monitor started.");
        true
    }

    /// Stops the tick loop, waits for it to exit and drops all counters and
    /// traffic baselines. Cascades it already launched keep running.
    pub async fn stop(&self) {
        let Some(task) = self.inner.task.lock().await.take() else {
            return;
        };
        let _ = task.shutdown_tx.send(true);
        if let Err(e) = task.handle.await {
            error!(error = %e, "Inactivity monitor task ended abnormally.");
        }
        self.reset();
        info!("Inactivity monitor stopped.");
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Clears all counters and traffic baselines.
    pub fn reset(&self) {
        self.clear_counters();
        self.clear_traffic_cache();
    }

    pub fn clear_counters(&self) {
        self.inner.counters.clear();
    }

    pub fn clear_traffic_cache(&self) {
        self.inner.traffic.clear();
    }

    /// Forgets everything tracked for one node.
    pub fn clear_node(&self, node_id: NodeId) {
        self.inner.counters.remove(&node_id);
        self.inner.traffic.remove(&node_id);
    }

    pub fn counters(&self) -> HashMap<NodeId, InactivityState> {
        self.inner
            .counters
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect()
    }

    pub fn counter_for(&self, node_id: NodeId) -> Option<InactivityState> {
        self.inner.counters.get(&node_id).map(|e| *e.value())
    }

    pub fn traffic_cache(&self) -> HashMap<NodeId, u64> {
        self.inner
            .traffic
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect()
    }

    /// Evaluates every enabled rule once, as of `now`.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickSummary {
        let rules = match self.inner.store.list_enabled_inactivity_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "Failed to load inactivity rules; skipping tick.");
                return TickSummary::default();
            }
        };

        let watched: HashSet<NodeId> = rules.iter().map(|r| r.node_id).collect();
        self.inner.counters.retain(|id, _| watched.contains(id));
        self.inner.traffic.retain(|id, _| watched.contains(id));

        let verdicts: Vec<(NodeId, NodeVerdict)> = stream::iter(rules)
            .map(|rule| {
                let this = self.clone();
                async move {
                    let node_id = rule.node_id;
                    (node_id, this.evaluate_rule(rule, now).await)
                }
            })
            .buffer_unordered(self.inner.settings.max_concurrency.max(1))
            .collect()
            .await;

        let mut summary = TickSummary::default();
        for (node_id, verdict) in verdicts {
            match verdict {
                NodeVerdict::Skipped => summary.skipped += 1,
                NodeVerdict::Evaluated(_) => summary.evaluated += 1,
                NodeVerdict::ShutdownTriggered => {
                    summary.evaluated += 1;
                    summary.triggered.push(node_id);
                }
            }
        }
        summary
    }

    async fn evaluate_rule(&self, rule: inactivity_rule::Model, now: DateTime<Utc>) -> NodeVerdict {
        let node = match self.inner.store.get_node(rule.node_id).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                warn!(node_id = %rule.node_id, "Inactivity rule points at a missing node.");
                return NodeVerdict::Skipped;
            }
            Err(e) => {
                error!(node_id = %rule.node_id, error = %e, "Failed to load node for inactivity check.");
                return NodeVerdict::Skipped;
            }
        };

        if node.status != NodeStatus::Online {
            self.clear_node(node.id);
            return NodeVerdict::Skipped;
        }
        if self.inner.launcher.has_active_cascade(node.id) {
            debug!(node = %node.name, "Cascade in progress; not sampling.");
            return NodeVerdict::Skipped;
        }

        let mut outcomes = Vec::new();
        for criterion in enabled_criteria(&rule.monitoring_criteria) {
            let outcome = self.sample(&node, criterion, &rule.monitoring_criteria).await;
            outcomes.push(outcome);
        }
        let verdict = criteria::aggregate(outcomes);

        match verdict {
            SignalOutcome::Active => {
                self.inner.counters.insert(
                    node.id,
                    InactivityState {
                        consecutive_inactive: 0,
                        inactive_since: Some(now),
                    },
                );
                debug!(node = %node.name, "Node active.");
                NodeVerdict::Evaluated(verdict)
            }
            SignalOutcome::Unknown => {
                debug!(node = %node.name, "Activity unknown this tick; counter unchanged.");
                NodeVerdict::Evaluated(verdict)
            }
            SignalOutcome::Inactive => {
                let interval = TimeDelta::from_std(self.inner.settings.interval).unwrap_or(TimeDelta::zero());
                let (count, idle_for) = {
                    let mut state = self.inner.counters.entry(node.id).or_default();
                    state.consecutive_inactive += 1;
                    let since = *state.inactive_since.get_or_insert(now - interval);
                    (state.consecutive_inactive, now - since)
                };
                let timeout = TimeDelta::minutes(i64::from(rule.timeout_minutes));
                debug!(
                    node = %node.name,
                    consecutive_inactive = count,
                    idle_secs = idle_for.num_seconds(),
                    timeout_secs = timeout.num_seconds(),
                    "Node inactive."
                );
                if idle_for >= timeout {
                    self.trigger_shutdown(&node, count, idle_for).await;
                    NodeVerdict::ShutdownTriggered
                } else {
                    NodeVerdict::Evaluated(verdict)
                }
            }
        }
    }

    async fn trigger_shutdown(&self, node: &node::Model, count: u32, idle_for: TimeDelta) {
        // Reset first: a failed stop must not refire on the next tick.
        self.inner.counters.remove(&node.id);
        let idle_minutes = idle_for.num_minutes();
        let details = serde_json::json!({
            "consecutiveInactiveTicks": count,
            "idleMinutes": idle_minutes,
        });

        match self.inner.launcher.stop_cascade(node.id).await {
            Ok(cascade_id) => {
                info!(node = %node.name, cascade_id = %cascade_id, idle_minutes, "Inactivity timeout reached; stop cascade launched.");
                self.inner
                    .logger
                    .record(
                        LogEntry::info(
                            SOURCE_INACTIVITY,
                            format!("'{}' idle for {} min; stopping", node.name, idle_minutes),
                        )
                        .node(node.id)
                        .cascade(cascade_id)
                        .reason(REASON_AUTO_SHUTDOWN),
                    )
                    .await;
            }
            Err(e) => {
                error!(node = %node.name, error = %e, "Inactivity timeout reached but stop cascade was refused.");
                self.inner
                    .logger
                    .record(
                        LogEntry::error(
                            SOURCE_INACTIVITY,
                            format!("'{}' idle for {} min; stop refused: {}", node.name, idle_minutes, e),
                        )
                        .node(node.id)
                        .reason(REASON_AUTO_SHUTDOWN)
                        .error_code(e.code(), details),
                    )
                    .await;
            }
        }
    }

    async fn sample(&self, node: &node::Model, criterion: Criterion, c: &MonitoringCriteria) -> SignalOutcome {
        let result = match criterion {
            Criterion::LastAccess => self.sample_reachability(node).await,
            Criterion::NetworkConnections => self
                .sample_command(node, criteria::CONNECTIONS_COMMAND)
                .await
                .and_then(|out| {
                    criteria::parse_connection_count(&out)
                        .map(criteria::connections_outcome)
                        .ok_or_else(|| format!("unparseable connection count: {:?}", out.trim()))
                }),
            Criterion::CpuRamActivity => self
                .sample_command(node, criteria::CPU_RAM_COMMAND)
                .await
                .and_then(|out| {
                    criteria::parse_cpu_ram(&out)
                        .map(|(cpu, ram)| criteria::cpu_ram_outcome(cpu, ram, c.cpu_threshold, c.ram_threshold))
                        .ok_or_else(|| format!("unparseable cpu/ram output: {:?}", out.trim()))
                }),
            Criterion::NetworkTraffic => self.sample_traffic(node, c.network_traffic_threshold).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(detail) => {
                warn!(node = %node.name, criterion = %criterion, code = "UNKNOWN_SIGNAL", detail = %detail, "Activity signal could not be evaluated.");
                self.inner
                    .logger
                    .record(
                        LogEntry::warn(
                            SOURCE_INACTIVITY,
                            format!("{} unknown for '{}': {}", criterion, node.name, detail),
                        )
                        .node(node.id)
                        .error_code(
                            "UNKNOWN_SIGNAL",
                            serde_json::json!({ "criterion": criterion.as_str(), "detail": detail }),
                        ),
                    )
                    .await;
                SignalOutcome::Unknown
            }
        }
    }

    /// Reachable means someone could be using it. Unreachable proves
    /// nothing, so it is unknown rather than inactive.
    async fn sample_reachability(&self, node: &node::Model) -> Result<SignalOutcome, String> {
        let target = node.probe_target().ok_or("no address configured")?;
        let reachable = self
            .inner
            .providers
            .probe
            .probe_reachable(&target, self.inner.settings.probe_timeout)
            .await;
        if reachable {
            Ok(SignalOutcome::Active)
        } else {
            Err(format!("{target} unreachable"))
        }
    }

    async fn sample_command(&self, node: &node::Model, command: &str) -> Result<String, String> {
        let remote = self
            .inner
            .providers
            .remote
            .as_ref()
            .ok_or("no remote executor configured")?;
        if node.capabilities.ssh.is_none() {
            return Err("node has no SSH capability".into());
        }
        let limit = self.inner.settings.signal_timeout;
        match tokio::time::timeout(limit, remote.exec_remote(node, command)).await {
            Ok(Ok(out)) if out.exit_code == 0 => Ok(out.stdout),
            Ok(Ok(out)) => Err(format!("exit code {}: {}", out.exit_code, out.stderr.trim())),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {limit:?}")),
        }
    }

    async fn sample_traffic(&self, node: &node::Model, threshold: u64) -> Result<SignalOutcome, String> {
        let reader = self
            .inner
            .providers
            .traffic
            .as_ref()
            .ok_or("no traffic reader configured")?;
        let limit = self.inner.settings.signal_timeout;
        let counters = match tokio::time::timeout(limit, reader.read_traffic_counters(node)).await {
            Ok(Ok(counters)) => counters,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => return Err(format!("timed out after {limit:?}")),
        };
        let current = counters.total();
        let previous = self.inner.traffic.insert(node.id, current);
        match criteria::traffic_outcome(previous, current, threshold) {
            SignalOutcome::Unknown => {
                debug!(node = %node.name, current, "Traffic baseline recorded.");
                Ok(SignalOutcome::Unknown)
            }
            outcome => Ok(outcome),
        }
    }
}

fn enabled_criteria(c: &MonitoringCriteria) -> Vec<Criterion> {
    [
        (c.last_access, Criterion::LastAccess),
        (c.network_connections, Criterion::NetworkConnections),
        (c.cpu_ram_activity, Criterion::CpuRamActivity),
        (c.network_traffic, Criterion::NetworkTraffic),
    ]
    .into_iter()
    .filter_map(|(on, criterion)| on.then_some(criterion))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::NodeType;
    use crate::db::memory_store::MemoryStore;
    use crate::test_support::{node, CountingLauncher, ScriptedExecutor, ScriptedProbe, ScriptedTraffic};
    use crate::db::entities::node::SshCapability;
    use uuid::Uuid;

    const INTERVAL: Duration = Duration::from_secs(120);

    struct Harness {
        store: Arc<MemoryStore>,
        probe: Arc<ScriptedProbe>,
        exec: Arc<ScriptedExecutor>,
        traffic: Arc<ScriptedTraffic>,
        launcher: Arc<CountingLauncher>,
        monitor: MonitorRuntime,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let probe = Arc::new(ScriptedProbe::always(false));
        let exec = Arc::new(ScriptedExecutor::default());
        let traffic = Arc::new(ScriptedTraffic::default());
        let launcher = Arc::new(CountingLauncher::default());
        let monitor = MonitorRuntime::new(
            store.clone(),
            SignalProviders {
                probe: probe.clone(),
                remote: Some(exec.clone()),
                traffic: Some(traffic.clone()),
            },
            launcher.clone(),
            OperationLogger::new(store.clone()),
            MonitorSettings {
                interval: INTERVAL,
                max_concurrency: 4,
                probe_timeout: Duration::from_millis(50),
                signal_timeout: Duration::from_millis(200),
            },
        );
        Harness { store, probe, exec, traffic, launcher, monitor }
    }

    impl Harness {
        async fn watched(&self, criteria: MonitoringCriteria, timeout_minutes: u32) -> NodeId {
            let mut n = node("nas", NodeType::Physical, NodeStatus::Online);
            n.capabilities.ssh = Some(SshCapability {
                username: "root".into(),
                port: 22,
                credential_ref: None,
            });
            let id = n.id;
            self.store.insert_node(n).await.unwrap();
            self.store
                .upsert_inactivity_rule(inactivity_rule::Model {
                    id: Uuid::new_v4(),
                    node_id: id,
                    timeout_minutes,
                    is_enabled: true,
                    monitoring_criteria: criteria,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
            id
        }
    }

    fn connections_only() -> MonitoringCriteria {
        MonitoringCriteria {
            last_access: false,
            network_connections: true,
            ..Default::default()
        }
    }

    fn tick_time(start: DateTime<Utc>, n: i32) -> DateTime<Utc> {
        start + TimeDelta::minutes(2 * i64::from(n))
    }

    #[tokio::test]
    async fn test_five_inactive_ticks_trigger_one_stop() {
        let h = harness();
        let id = h.watched(connections_only(), 10).await;
        h.exec.set_stdout("0\n");
        let t0 = Utc::now();

        for n in 0..4 {
            let summary = h.monitor.run_tick(tick_time(t0, n)).await;
            assert!(summary.triggered.is_empty(), "fired early on tick {}", n + 1);
        }
        assert_eq!(h.monitor.counter_for(id).unwrap().consecutive_inactive, 4);

        let summary = h.monitor.run_tick(tick_time(t0, 4)).await;
        assert_eq!(summary.triggered, vec![id]);
        assert_eq!(h.launcher.stops(), vec![id]);
        assert!(h.monitor.counter_for(id).is_none());

        let logs = h.store.operation_logs().await;
        assert!(logs.iter().any(|l| l.reason.as_deref() == Some(REASON_AUTO_SHUTDOWN)));
    }

    #[tokio::test]
    async fn test_activity_on_third_tick_restarts_the_count() {
        let h = harness();
        let id = h.watched(connections_only(), 10).await;
        let t0 = Utc::now();

        for n in 0..9 {
            h.exec.set_stdout(if n == 2 { "4\n" } else { "0\n" });
            h.monitor.run_tick(tick_time(t0, n)).await;
            if n < 7 {
                assert!(h.launcher.stops().is_empty(), "fired on tick {}", n + 1);
            }
        }
        // Ticks 4 through 8 are the five fresh inactive ticks.
        assert_eq!(h.launcher.stops(), vec![id]);
    }

    #[tokio::test]
    async fn test_unknown_neither_counts_nor_resets() {
        let h = harness();
        let id = h.watched(connections_only(), 60).await;
        let t0 = Utc::now();

        h.exec.set_stdout("0\n");
        h.monitor.run_tick(tick_time(t0, 0)).await;
        h.monitor.run_tick(tick_time(t0, 1)).await;

        h.exec.set_failing(true);
        h.monitor.run_tick(tick_time(t0, 2)).await;
        assert_eq!(h.monitor.counter_for(id).unwrap().consecutive_inactive, 2);

        let logs = h.store.operation_logs().await;
        assert!(logs.iter().any(|l| l.error_code.as_deref() == Some("UNKNOWN_SIGNAL")));

        h.exec.set_failing(false);
        h.monitor.run_tick(tick_time(t0, 3)).await;
        assert_eq!(h.monitor.counter_for(id).unwrap().consecutive_inactive, 3);
    }

    #[tokio::test]
    async fn test_unreachable_is_unknown_not_inactive() {
        let h = harness();
        let id = h.watched(MonitoringCriteria::default(), 1).await;
        let t0 = Utc::now();

        for n in 0..5 {
            h.monitor.run_tick(tick_time(t0, n)).await;
        }
        assert!(h.launcher.stops().is_empty());
        assert!(h.monitor.counter_for(id).is_none());

        h.probe.set(true);
        h.monitor.run_tick(tick_time(t0, 5)).await;
        assert_eq!(h.monitor.counter_for(id).unwrap().consecutive_inactive, 0);
    }

    #[tokio::test]
    async fn test_first_traffic_tick_is_never_inactive() {
        let h = harness();
        let criteria = MonitoringCriteria {
            last_access: false,
            network_traffic: true,
            network_traffic_threshold: 1000,
            ..Default::default()
        };
        let id = h.watched(criteria, 1).await;
        let t0 = Utc::now();

        h.traffic.set(50_000, 50_000);
        let summary = h.monitor.run_tick(tick_time(t0, 0)).await;
        assert_eq!(summary.evaluated, 1);
        assert!(h.monitor.counter_for(id).is_none());
        assert_eq!(h.monitor.traffic_cache().get(&id), Some(&100_000));

        // Flat counters on the second tick: inactive, and 1 min timeout is met.
        let summary = h.monitor.run_tick(tick_time(t0, 1)).await;
        assert_eq!(summary.triggered, vec![id]);
    }

    #[tokio::test]
    async fn test_any_active_criterion_keeps_node_up() {
        let h = harness();
        let criteria = MonitoringCriteria {
            last_access: false,
            network_connections: true,
            cpu_ram_activity: true,
            ..Default::default()
        };
        let id = h.watched(criteria, 1).await;
        // The same stdout feeds both commands: 0 connections, 0% cpu, 80% ram.
        h.exec.set_stdout("0\n80\n");
        let t0 = Utc::now();

        for n in 0..3 {
            h.monitor.run_tick(tick_time(t0, n)).await;
        }
        assert!(h.launcher.stops().is_empty());
        assert_eq!(h.monitor.counter_for(id).unwrap().consecutive_inactive, 0);
    }

    #[tokio::test]
    async fn test_offline_or_busy_nodes_are_skipped() {
        let h = harness();
        let id = h.watched(connections_only(), 10).await;
        h.exec.set_stdout("0\n");
        let t0 = Utc::now();

        h.monitor.run_tick(tick_time(t0, 0)).await;
        assert!(h.monitor.counter_for(id).is_some());

        h.launcher.mark_busy(id, true);
        let summary = h.monitor.run_tick(tick_time(t0, 1)).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(h.monitor.counter_for(id).unwrap().consecutive_inactive, 1);
        h.launcher.mark_busy(id, false);

        h.store.update_node_status(id, NodeStatus::Offline).await.unwrap();
        let summary = h.monitor.run_tick(tick_time(t0, 2)).await;
        assert_eq!(summary.skipped, 1);
        assert!(h.monitor.counter_for(id).is_none());
    }

    #[tokio::test]
    async fn test_refused_stop_still_resets_counter() {
        let h = harness();
        let id = h.watched(connections_only(), 4).await;
        h.exec.set_stdout("0\n");
        h.launcher.set_failing(true);
        let t0 = Utc::now();

        h.monitor.run_tick(tick_time(t0, 0)).await;
        let summary = h.monitor.run_tick(tick_time(t0, 1)).await;
        assert_eq!(summary.triggered, vec![id]);
        assert!(h.monitor.counter_for(id).is_none());

        let summary = h.monitor.run_tick(tick_time(t0, 2)).await;
        assert!(summary.triggered.is_empty());
        assert_eq!(h.launcher.stops().len(), 1);
        let logs = h.store.operation_logs().await;
        assert!(logs
            .iter()
            .any(|l| l.reason.as_deref() == Some(REASON_AUTO_SHUTDOWN) && l.error_code.as_deref() == Some("CASCADE_ALREADY_ACTIVE")));
    }

    #[tokio::test]
    async fn test_reset_and_lifecycle() {
        let h = harness();
        let id = h.watched(connections_only(), 10).await;
        h.exec.set_stdout("0\n");
        h.monitor.run_tick(Utc::now()).await;
        assert_eq!(h.monitor.counters().len(), 1);

        h.monitor.reset();
        assert!(h.monitor.counters().is_empty());
        assert!(h.monitor.counter_for(id).is_none());

        assert!(h.monitor.start().await);
        assert!(!h.monitor.start().await);
        assert!(h.monitor.is_running().await);
        h.monitor.stop().await;
        assert!(!h.monitor.is_running().await);
        assert!(h.monitor.start().await);
        h.monitor.stop().await;
    }

    #[tokio::test]
    async fn test_restart_begins_with_fresh_state() {
        let h = harness();
        let id = h.watched(connections_only(), 10).await;
        let metered = h
            .watched(
                MonitoringCriteria {
                    last_access: false,
                    network_traffic: true,
                    network_traffic_threshold: 1000,
                    ..Default::default()
                },
                10,
            )
            .await;
        h.exec.set_stdout("0\n");
        h.traffic.set(10, 10);
        let t0 = Utc::now();

        h.monitor.run_tick(t0).await;
        assert_eq!(h.monitor.counter_for(id).unwrap().consecutive_inactive, 1);
        assert_eq!(h.monitor.traffic_cache().get(&metered), Some(&20));

        assert!(h.monitor.start().await);
        h.monitor.stop().await;
        assert!(h.monitor.counters().is_empty());
        assert!(h.monitor.traffic_cache().is_empty());

        // An hour later, a stale anchor would fire the 10 min timeout at once.
        let summary = h.monitor.run_tick(t0 + TimeDelta::minutes(60)).await;
        assert!(summary.triggered.is_empty());
        assert!(h.launcher.stops().is_empty());
        assert_eq!(h.monitor.counter_for(id).unwrap().consecutive_inactive, 1);
    }
}
