use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::enums::{NodeStatus, NodeType};

pub type NodeId = Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: NodeId,
    pub name: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub ip_address: Option<String>,
    pub parent_id: Option<NodeId>, // structural container, e.g. the Proxmox host of a VM
    #[serde(default)]
    pub capabilities: Capabilities,
    pub platform_ref: Option<String>, // VMID / container id inside the parent platform
    #[serde(default)]
    pub confirm_before_shutdown: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub discovered: bool,
    #[serde(default = "default_configured")]
    pub configured: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

fn default_configured() -> bool {
    true
}

/// Connection descriptors attached to a node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub ssh: Option<SshCapability>,
    pub wol: Option<WolCapability>,
    pub platform_api: Option<PlatformApiCapability>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshCapability {
    pub username: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub credential_ref: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WolCapability {
    pub mac_address: String,
    pub broadcast_address: Option<String>,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Proxmox,
    Docker,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformApiCapability {
    pub kind: PlatformKind,
    pub endpoint: String,
    pub credential_ref: Option<String>,
}

impl Model {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            node_type,
            status: NodeStatus::Offline,
            ip_address: None,
            parent_id: None,
            capabilities: Capabilities::default(),
            platform_ref: None,
            confirm_before_shutdown: false,
            is_pinned: false,
            discovered: false,
            configured: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// `host:port` used for reachability probes. The SSH port when one is
    /// configured, 22 otherwise.
    pub fn probe_target(&self) -> Option<String> {
        let ip = self.ip_address.as_deref()?;
        let port = self
            .capabilities
            .ssh
            .as_ref()
            .map(|s| s.port)
            .unwrap_or_else(default_ssh_port);
        Some(format!("{ip}:{port}"))
    }

    pub fn is_platform_host(&self) -> bool {
        self.capabilities.platform_api.is_some()
    }
}
