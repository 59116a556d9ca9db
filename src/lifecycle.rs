//! Node lifecycle state machine:
//! `offline -> starting -> online -> stopping -> offline`, with `error`
//! reachable from `starting`/`stopping` and left only by a new start (or
//! stop) attempt. The cascade orchestrator is the sole caller of
//! [`check_transition`]; no other component writes `Node.status`.
use crate::db::enums::NodeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: NodeStatus,
    pub to: NodeStatus,
}

pub fn is_allowed(from: NodeStatus, to: NodeStatus) -> bool {
    use NodeStatus::*;
    matches!(
        (from, to),
        (Offline, Starting)
            | (Error, Starting)
            | (Starting, Online)
            | (Starting, Error)
            | (Online, Stopping)
            | (Error, Stopping)
            | (Stopping, Offline)
            | (Stopping, Error)
            // An unconfirmed stop puts the node back where it was.
            | (Stopping, Online)
    )
}

pub fn check_transition(from: NodeStatus, to: NodeStatus) -> Result<NodeStatus, TransitionError> {
    if is_allowed(from, to) {
        Ok(to)
    } else {
        Err(TransitionError { from, to })
    }
}
