//! Fakes for the capability providers, the cascade launcher and storage.
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::cascade::{CascadeError, CascadeLauncher};
use crate::connectors::{
    ExecOutput, PlatformApi, PowerController, ProviderError, ReachabilityProbe, RemoteExecutor,
    TrafficCounters, TrafficReader,
};
use crate::db::entities::{
    cascade, dependency_link, inactivity_rule, node, operation_log, CascadeId, LinkId, NodeId,
};
use crate::db::enums::{NodeStatus, NodeType};
use crate::db::memory_store::MemoryStore;
use crate::db::store::{Store, StoreError};

/// A node with an address, so it can be probed.
pub fn node(name: &str, node_type: NodeType, status: NodeStatus) -> node::Model {
    let mut n = node::Model::new(name, node_type);
    n.status = status;
    n.ip_address = Some("192.0.2.10".into());
    n
}

/// Replays scripted answers; the last one repeats forever.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
}

impl ScriptedProbe {
    pub fn always(reachable: bool) -> Self {
        Self::sequence(vec![reachable])
    }

    pub fn sequence(answers: Vec<bool>) -> Self {
        let last = answers.last().copied().unwrap_or(false);
        Self {
            script: Mutex::new(answers.into()),
            last: Mutex::new(last),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.script.lock().unwrap().clear();
        *self.last.lock().unwrap() = reachable;
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe_reachable(&self, _address: &str, _timeout: Duration) -> bool {
        match self.script.lock().unwrap().pop_front() {
            Some(answer) => {
                *self.last.lock().unwrap() = answer;
                answer
            }
            None => *self.last.lock().unwrap(),
        }
    }
}

/// Records commands and answers every one with the same stdout.
#[derive(Default)]
pub struct ScriptedExecutor {
    stdout: Mutex<String>,
    failing: AtomicBool,
    commands: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn replying(stdout: &str) -> Self {
        let exec = Self::default();
        exec.set_stdout(stdout);
        exec
    }

    pub fn set_stdout(&self, stdout: &str) {
        *self.stdout.lock().unwrap() = stdout.to_string();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn exec_remote(&self, _node: &node::Model, command: &str) -> Result<ExecOutput, ProviderError> {
        self.commands.lock().unwrap().push(command.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "ssh: connection refused",
            )));
        }
        Ok(ExecOutput {
            stdout: self.stdout.lock().unwrap().clone(),
            stderr: String::new(),
            exit_code: 0,
        })
    }
}

#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<String>>,
}

impl RecordingPlatform {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformApi for RecordingPlatform {
    async fn start_resource(&self, _host: &node::Model, resource: &node::Model) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(format!("start:{}", resource.name));
        Ok(())
    }

    async fn stop_resource(&self, _host: &node::Model, resource: &node::Model) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(format!("stop:{}", resource.name));
        Ok(())
    }
}

/// Cumulative rx+tx counters set by the test. Unset counters fail the read.
#[derive(Default)]
pub struct ScriptedTraffic {
    counters: Mutex<Option<TrafficCounters>>,
}

impl ScriptedTraffic {
    pub fn set(&self, rx_bytes: u64, tx_bytes: u64) {
        *self.counters.lock().unwrap() = Some(TrafficCounters { rx_bytes, tx_bytes });
    }
}

#[async_trait]
impl TrafficReader for ScriptedTraffic {
    async fn read_traffic_counters(&self, _node: &node::Model) -> Result<TrafficCounters, ProviderError> {
        (*self.counters.lock().unwrap()).ok_or_else(|| ProviderError::Platform("counters unavailable".into()))
    }
}

/// Records `on:<name>` / `off:<name>` in call order. Calls for names in the
/// failing set return an error; a gate, when set, holds every call until a
/// permit is added.
#[derive(Default)]
pub struct RecordingPowerController {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingPowerController {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, op: &str, node: &node::Model) -> Result<(), ProviderError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.calls.lock().unwrap().push(format!("{op}:{}", node.name));
        if self.failing.lock().unwrap().contains(&node.name) {
            return Err(ProviderError::Platform(format!("{op} refused for {}", node.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl PowerController for RecordingPowerController {
    async fn power_on(&self, node: &node::Model) -> Result<(), ProviderError> {
        self.record("on", node).await
    }

    async fn power_off(&self, node: &node::Model) -> Result<(), ProviderError> {
        self.record("off", node).await
    }
}

#[derive(Default)]
pub struct CountingLauncher {
    stops: Mutex<Vec<NodeId>>,
    busy: Mutex<HashSet<NodeId>>,
    failing: AtomicBool,
}

impl CountingLauncher {
    pub fn stops(&self) -> Vec<NodeId> {
        self.stops.lock().unwrap().clone()
    }

    pub fn mark_busy(&self, node_id: NodeId, busy: bool) {
        let mut set = self.busy.lock().unwrap();
        if busy {
            set.insert(node_id);
        } else {
            set.remove(&node_id);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CascadeLauncher for CountingLauncher {
    async fn stop_cascade(&self, node_id: NodeId) -> Result<CascadeId, CascadeError> {
        self.stops.lock().unwrap().push(node_id);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CascadeError::CascadeAlreadyActive {
                node_id,
                cascade_id: Uuid::new_v4(),
            });
        }
        Ok(Uuid::new_v4())
    }

    fn has_active_cascade(&self, node_id: NodeId) -> bool {
        self.busy.lock().unwrap().contains(&node_id)
    }
}

/// Memory store whose link deletes can be made to fail.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    fail_link_deletes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_link_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_link_deletes(&self, failing: bool) {
        self.fail_link_deletes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn list_nodes(&self) -> Result<Vec<node::Model>, StoreError> {
        self.inner.list_nodes().await
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<node::Model>, StoreError> {
        self.inner.get_node(id).await
    }

    async fn insert_node(&self, model: node::Model) -> Result<(), StoreError> {
        self.inner.insert_node(model).await
    }

    async fn update_node_status(&self, id: NodeId, status: NodeStatus) -> Result<(), StoreError> {
        self.inner.update_node_status(id, status).await
    }

    async fn delete_nodes(&self, ids: &[NodeId]) -> Result<u64, StoreError> {
        self.inner.delete_nodes(ids).await
    }

    async fn list_links(&self) -> Result<Vec<dependency_link::Model>, StoreError> {
        self.inner.list_links().await
    }

    async fn insert_link(&self, model: dependency_link::Model) -> Result<(), StoreError> {
        self.inner.insert_link(model).await
    }

    async fn delete_links(&self, ids: &[LinkId]) -> Result<u64, StoreError> {
        if self.fail_link_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("link table locked".into()));
        }
        self.inner.delete_links(ids).await
    }

    async fn insert_cascade(&self, model: cascade::Model) -> Result<(), StoreError> {
        self.inner.insert_cascade(model).await
    }

    async fn update_cascade(&self, model: &cascade::Model) -> Result<(), StoreError> {
        self.inner.update_cascade(model).await
    }

    async fn get_cascade(&self, id: CascadeId) -> Result<Option<cascade::Model>, StoreError> {
        self.inner.get_cascade(id).await
    }

    async fn list_unfinished_cascades(&self) -> Result<Vec<cascade::Model>, StoreError> {
        self.inner.list_unfinished_cascades().await
    }

    async fn append_operation_log(&self, entry: operation_log::Model) -> Result<(), StoreError> {
        self.inner.append_operation_log(entry).await
    }

    async fn list_enabled_inactivity_rules(&self) -> Result<Vec<inactivity_rule::Model>, StoreError> {
        self.inner.list_enabled_inactivity_rules().await
    }

    async fn get_inactivity_rule(&self, node_id: NodeId) -> Result<Option<inactivity_rule::Model>, StoreError> {
        self.inner.get_inactivity_rule(node_id).await
    }

    async fn upsert_inactivity_rule(&self, model: inactivity_rule::Model) -> Result<(), StoreError> {
        self.inner.upsert_inactivity_rule(model).await
    }

    async fn delete_inactivity_rules(&self, node_ids: &[NodeId]) -> Result<u64, StoreError> {
        self.inner.delete_inactivity_rules(node_ids).await
    }
}
