use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::NodeId;

pub type LinkId = Uuid;

/// Directed edge `parent -> child`: the child depends on the parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: LinkId,
    pub parent_id: NodeId,
    pub child_id: NodeId,
    pub is_structural: bool,
    pub is_shared: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
