use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use crate::db::entities::{operation_log, CascadeId, NodeId};
use crate::db::enums::LogLevel;
use crate::db::store::Store;

pub const SOURCE_CASCADE: &str = "cascade";
pub const SOURCE_INACTIVITY: &str = "inactivity-monitor";
pub const SOURCE_CONNECTION_TEST: &str = "connection-test";
pub const SOURCE_TOPOLOGY: &str = "topology";

pub const REASON_AUTO_SHUTDOWN: &str = "auto-shutdown";
pub const REASON_CASCADE_DELETE: &str = "service-cascade-delete";
pub const REASON_SHARED_DEPENDENCY: &str = "shared-dependency-in-use";
pub const REASON_RETAINED_DEPENDENT: &str = "required-by-retained-dependent";

#[derive(Debug, Clone)]
pub struct LogEntry {
    level: LogLevel,
    source: &'static str,
    message: String,
    reason: Option<String>,
    error_code: Option<String>,
    error_details: Option<serde_json::Value>,
    node_id: Option<NodeId>,
    cascade_id: Option<CascadeId>,
}

impl LogEntry {
    fn new(level: LogLevel, source: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            source,
            message: message.into(),
            reason: None,
            error_code: None,
            error_details: None,
            node_id: None,
            cascade_id: None,
        }
    }

    pub fn info(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, source, message)
    }

    pub fn warn(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, source, message)
    }

    pub fn error(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, source, message)
    }

    pub fn node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn cascade(mut self, cascade_id: CascadeId) -> Self {
        self.cascade_id = Some(cascade_id);
        self
    }

    pub fn reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn error_code(mut self, code: &str, details: serde_json::Value) -> Self {
        self.error_code = Some(code.to_string());
        self.error_details = Some(details);
        self
    }
}

/// Append-only writer for the operator-facing operation log.
#[derive(Clone)]
pub struct OperationLogger {
    store: Arc<dyn Store>,
}

impl OperationLogger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Persists the entry. A storage failure is reported through `tracing`
    /// and does not fail the calling operation.
    pub async fn record(&self, entry: LogEntry) {
        let model = operation_log::Model {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            level: entry.level,
            source: entry.source.to_string(),
            message: entry.message,
            reason: entry.reason,
            error_code: entry.error_code,
            error_details: entry.error_details,
            node_id: entry.node_id,
            cascade_id: entry.cascade_id,
        };
        if let Err(e) = self.store.append_operation_log(model).await {
            error!(error = %e, "Failed to persist operation log entry.");
        }
    }
}
