//! Capability providers the core calls into. SSH, Proxmox and Docker wire
//! protocols live behind these traits; the TCP probe and Wake-on-LAN sender
//! are small enough to ship here.
pub mod power;
pub mod tcp_probe;
pub mod wol;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::db::entities::node;

pub use power::DefaultPowerController;
pub use tcp_probe::TcpProbe;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Node '{node}' has no {capability} capability")]
    MissingCapability { node: String, capability: &'static str },
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Remote command exited with {exit_code}: {stderr}")]
    Command { exit_code: i32, stderr: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Platform API error: {0}")]
    Platform(String),
    #[error("Invalid capability configuration: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Timeout(_) => "TIMEOUT",
            ProviderError::MissingCapability { .. } => "MISSING_CAPABILITY",
            ProviderError::Unsupported(_) => "UNSUPPORTED",
            ProviderError::Command { .. } => "COMMAND_FAILED",
            ProviderError::Io(_) => "IO_ERROR",
            ProviderError::Platform(_) => "PLATFORM_ERROR",
            ProviderError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl TrafficCounters {
    pub fn total(&self) -> u64 {
        self.rx_bytes.saturating_add(self.tx_bytes)
    }
}

/// Power primitives. `power_on` returns once the node is confirmed ready,
/// `power_off` once it is confirmed stopped.
#[async_trait]
pub trait PowerController: Send + Sync {
    async fn power_on(&self, node: &node::Model) -> Result<(), ProviderError>;
    async fn power_off(&self, node: &node::Model) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe_reachable(&self, address: &str, timeout: Duration) -> bool;
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn exec_remote(&self, node: &node::Model, command: &str) -> Result<ExecOutput, ProviderError>;
}

#[async_trait]
pub trait TrafficReader: Send + Sync {
    async fn read_traffic_counters(&self, node: &node::Model) -> Result<TrafficCounters, ProviderError>;
}

/// Start/stop of a resource (VM, LXC, container) hosted by a platform node.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn start_resource(&self, host: &node::Model, resource: &node::Model) -> Result<(), ProviderError>;
    async fn stop_resource(&self, host: &node::Model, resource: &node::Model) -> Result<(), ProviderError>;
}

/// The capability providers available to the inactivity monitor. Any of
/// the optional ones may be absent; criteria needing them then evaluate to
/// unknown.
#[derive(Clone)]
pub struct SignalProviders {
    pub probe: Arc<dyn ReachabilityProbe>,
    pub remote: Option<Arc<dyn RemoteExecutor>>,
    pub traffic: Option<Arc<dyn TrafficReader>>,
}
