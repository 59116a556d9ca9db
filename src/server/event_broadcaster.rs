use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::db::entities::{CascadeId, NodeId};
use crate::db::enums::NodeStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventError {
    pub code: String,
    pub message: String,
}

/// Notifications published by the orchestrator and the monitor. The
/// transport that forwards them to connected clients subscribes here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    StatusChange {
        node_id: NodeId,
        previous: NodeStatus,
        status: NodeStatus,
    },
    #[serde(rename_all = "camelCase")]
    CascadeProgress {
        cascade_id: CascadeId,
        node_id: NodeId,
        step: u32,
        total_steps: u32,
        current_node_id: NodeId,
        current_node_name: String,
    },
    #[serde(rename_all = "camelCase")]
    CascadeComplete {
        cascade_id: CascadeId,
        node_id: NodeId,
        success: bool,
    },
    #[serde(rename_all = "camelCase")]
    CascadeError {
        cascade_id: CascadeId,
        node_id: NodeId,
        failed_step: u32,
        error: EventError,
    },
}

impl ServerEvent {
    fn kind(&self) -> &'static str {
        match self {
            ServerEvent::StatusChange { .. } => "status-change",
            ServerEvent::CascadeProgress { .. } => "cascade-progress",
            ServerEvent::CascadeComplete { .. } => "cascade-complete",
            ServerEvent::CascadeError { .. } => "cascade-error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    events_tx: broadcast::Sender<ServerEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity.max(1));
        Self { events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    pub fn publish(&self, event: ServerEvent) {
        let kind = event.kind();
        let receiver_count = self.events_tx.receiver_count();
        if receiver_count == 0 {
            debug!(event_type = kind, "No active receivers, skipping broadcast.");
            return;
        }
        match self.events_tx.send(event) {
            Ok(n) => debug!(event_type = kind, "Broadcasted event to {} receivers.", n),
            Err(e) => debug!(event_type = kind, error = %e, "Broadcast failed; receivers went away."),
        }
    }

    pub fn status_change(&self, node_id: NodeId, previous: NodeStatus, status: NodeStatus) {
        debug!(node_id = %node_id, %previous, %status, "Broadcasting status change.");
        self.publish(ServerEvent::StatusChange { node_id, previous, status });
    }

    pub fn cascade_progress(
        &self,
        cascade_id: CascadeId,
        node_id: NodeId,
        step: u32,
        total_steps: u32,
        current_node_id: NodeId,
        current_node_name: &str,
    ) {
        self.publish(ServerEvent::CascadeProgress {
            cascade_id,
            node_id,
            step,
            total_steps,
            current_node_id,
            current_node_name: current_node_name.to_string(),
        });
    }

    pub fn cascade_complete(&self, cascade_id: CascadeId, node_id: NodeId, success: bool) {
        info!(cascade_id = %cascade_id, node_id = %node_id, success, "Broadcasting cascade completion.");
        self.publish(ServerEvent::CascadeComplete { cascade_id, node_id, success });
    }

    pub fn cascade_error(&self, cascade_id: CascadeId, node_id: NodeId, failed_step: u32, code: &str, message: String) {
        self.publish(ServerEvent::CascadeError {
            cascade_id,
            node_id,
            failed_step,
            error: EventError {
                code: code.to_string(),
                message,
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let b = EventBroadcaster::new(16);
        let mut rx = b.subscribe();
        let (c, n) = (Uuid::new_v4(), Uuid::new_v4());

        b.cascade_progress(c, n, 1, 2, n, "nas");
        b.cascade_complete(c, n, true);

        assert!(matches!(rx.recv().await.unwrap(), ServerEvent::CascadeProgress { step: 1, .. }));
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerEvent::CascadeComplete { cascade_id: c, node_id: n, success: true }
        );
    }

    #[test]
    fn test_wire_format_uses_kebab_type_and_camel_fields() {
        let (c, n) = (Uuid::new_v4(), Uuid::new_v4());
        let event = ServerEvent::CascadeError {
            cascade_id: c,
            node_id: n,
            failed_step: 2,
            error: EventError { code: "STEP_FAILED".into(), message: "boom".into() },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cascade-error");
        assert_eq!(json["payload"]["failedStep"], 2);
        assert_eq!(json["payload"]["error"]["code"], "STEP_FAILED");
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let b = EventBroadcaster::new(4);
        b.status_change(Uuid::new_v4(), NodeStatus::Offline, NodeStatus::Starting);
    }
}
