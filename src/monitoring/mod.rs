//! Inactivity monitor: samples activity signals for nodes with an enabled
//! rule and stops them through a cascade once idle long enough.
pub mod criteria;
pub mod rules;
pub mod runtime;

pub use criteria::{aggregate, Criterion, SignalOutcome};
pub use rules::{InactivityRuleService, RuleError};
pub use runtime::{InactivityState, MonitorRuntime, MonitorSettings, NodeVerdict, TickSummary};
