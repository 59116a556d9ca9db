use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{cascade::CascadeId, node::NodeId};
use crate::db::enums::LogLevel;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    pub reason: Option<String>,
    pub error_code: Option<String>,
    pub error_details: Option<serde_json::Value>,
    pub node_id: Option<NodeId>,
    pub cascade_id: Option<CascadeId>,
}
