use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "CONFIG_READ",
            ConfigError::Parse { .. } => "CONFIG_PARSE",
            ConfigError::Env(_) => "CONFIG_ENV",
            ConfigError::Invalid(_) => "CONFIG_INVALID",
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub monitor_interval_seconds: u64,
    pub monitor_max_concurrency: usize,
    pub probe_timeout_seconds: u64,
    pub signal_timeout_seconds: u64,
    pub step_timeout_seconds: u64,
    pub ready_poll_interval_seconds: u64,
    pub event_channel_capacity: usize,
    pub log_dir: String,
    pub monitor_enabled: bool,
    /// TOML file with nodes, links and rules to seed the in-memory store.
    pub topology_path: Option<String>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    monitor_interval_seconds: Option<u64>,
    monitor_max_concurrency: Option<usize>,
    probe_timeout_seconds: Option<u64>,
    signal_timeout_seconds: Option<u64>,
    step_timeout_seconds: Option<u64>,
    ready_poll_interval_seconds: Option<u64>,
    event_channel_capacity: Option<usize>,
    log_dir: Option<String>,
    monitor_enabled: Option<bool>,
    topology_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            monitor_interval_seconds: 60,
            monitor_max_concurrency: 8,
            probe_timeout_seconds: 5,
            signal_timeout_seconds: 15,
            step_timeout_seconds: 300,
            ready_poll_interval_seconds: 5,
            event_channel_capacity: 256,
            log_dir: "logs".to_string(),
            monitor_enabled: true,
            topology_path: None,
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by the TOML file at `config_path` (if it exists),
    /// overridden by environment variables (`.env` included).
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|source| ConfigError::Read {
                    path: path_str.to_string(),
                    source,
                })?;
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path_str.to_string(),
                    source,
                })?
            }
            _ => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env()?;

        // 3. Merge: environment overrides file
        merge(env_config, file_config).validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        let positive = [
            ("monitor_interval_seconds", self.monitor_interval_seconds),
            ("monitor_max_concurrency", self.monitor_max_concurrency as u64),
            ("probe_timeout_seconds", self.probe_timeout_seconds),
            ("signal_timeout_seconds", self.signal_timeout_seconds),
            ("step_timeout_seconds", self.step_timeout_seconds),
            ("ready_poll_interval_seconds", self.ready_poll_interval_seconds),
            ("event_channel_capacity", self.event_channel_capacity as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        Ok(self)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn signal_timeout(&self) -> Duration {
        Duration::from_secs(self.signal_timeout_seconds)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_seconds)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ready_poll_interval_seconds)
    }
}

fn merge(env: PartialServerConfig, file: PartialServerConfig) -> ServerConfig {
    let d = ServerConfig::default();
    ServerConfig {
        monitor_interval_seconds: env
            .monitor_interval_seconds
            .or(file.monitor_interval_seconds)
            .unwrap_or(d.monitor_interval_seconds),
        monitor_max_concurrency: env
            .monitor_max_concurrency
            .or(file.monitor_max_concurrency)
            .unwrap_or(d.monitor_max_concurrency),
        probe_timeout_seconds: env
            .probe_timeout_seconds
            .or(file.probe_timeout_seconds)
            .unwrap_or(d.probe_timeout_seconds),
        signal_timeout_seconds: env
            .signal_timeout_seconds
            .or(file.signal_timeout_seconds)
            .unwrap_or(d.signal_timeout_seconds),
        step_timeout_seconds: env
            .step_timeout_seconds
            .or(file.step_timeout_seconds)
            .unwrap_or(d.step_timeout_seconds),
        ready_poll_interval_seconds: env
            .ready_poll_interval_seconds
            .or(file.ready_poll_interval_seconds)
            .unwrap_or(d.ready_poll_interval_seconds),
        event_channel_capacity: env
            .event_channel_capacity
            .or(file.event_channel_capacity)
            .unwrap_or(d.event_channel_capacity),
        log_dir: env.log_dir.or(file.log_dir).unwrap_or(d.log_dir),
        monitor_enabled: env.monitor_enabled.or(file.monitor_enabled).unwrap_or(d.monitor_enabled),
        topology_path: env.topology_path.or(file.topology_path),
    }
}
