pub mod cascade;
pub mod dependency_link;
pub mod inactivity_rule;
pub mod node;
pub mod operation_log;

pub use cascade::CascadeId;
pub use dependency_link::LinkId;
pub use node::NodeId;
