pub mod config;
pub mod event_broadcaster;
pub mod seed;

pub use config::{ConfigError, ServerConfig};
pub use event_broadcaster::{EventBroadcaster, ServerEvent};
pub use seed::{apply_topology, read_topology, SeedError, TopologyFile};
