use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::NodeId;
use crate::db::enums::{CascadeStatus, CascadeType};

pub type CascadeId = Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: CascadeId,
    pub node_id: NodeId,
    pub cascade_type: CascadeType,
    pub status: CascadeStatus,
    pub step: u32,
    pub total_steps: u32,
    pub current_node_id: Option<NodeId>,
    pub failed_step: Option<u32>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Model {
    pub fn new(node_id: NodeId, cascade_type: CascadeType, total_steps: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id,
            cascade_type,
            status: CascadeStatus::Pending,
            step: 0,
            total_steps,
            current_node_id: None,
            failed_step: None,
            error_code: None,
            error_message: None,
            started_at: chrono::Utc::now(),
            completed_at: None,
        }
    }
}
