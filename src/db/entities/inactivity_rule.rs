use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::NodeId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: Uuid,
    pub node_id: NodeId,
    pub timeout_minutes: u32,
    pub is_enabled: bool,
    pub monitoring_criteria: MonitoringCriteria,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Which activity signals a rule samples, with their thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringCriteria {
    #[serde(default)]
    pub last_access: bool,
    #[serde(default)]
    pub network_connections: bool,
    #[serde(default)]
    pub cpu_ram_activity: bool,
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f64, // percent
    #[serde(default = "default_ram_threshold")]
    pub ram_threshold: f64, // percent
    #[serde(default)]
    pub network_traffic: bool,
    #[serde(default = "default_traffic_threshold")]
    pub network_traffic_threshold: u64, // bytes per tick
}

fn default_cpu_threshold() -> f64 {
    10.0
}

fn default_ram_threshold() -> f64 {
    50.0
}

fn default_traffic_threshold() -> u64 {
    1024 * 1024
}

impl Default for MonitoringCriteria {
    fn default() -> Self {
        Self {
            last_access: true,
            network_connections: false,
            cpu_ram_activity: false,
            cpu_threshold: default_cpu_threshold(),
            ram_threshold: default_ram_threshold(),
            network_traffic: false,
            network_traffic_threshold: default_traffic_threshold(),
        }
    }
}

impl MonitoringCriteria {
    pub fn any_enabled(&self) -> bool {
        self.last_access || self.network_connections || self.cpu_ram_activity || self.network_traffic
    }
}
