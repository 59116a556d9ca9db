use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Physical,
    Vm,
    Lxc,
    Container,
}

impl FromStr for NodeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physical" => Ok(NodeType::Physical),
            "vm" => Ok(NodeType::Vm),
            "lxc" => Ok(NodeType::Lxc),
            "container" => Ok(NodeType::Container),
            _ => Err(()),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Physical => "physical",
            NodeType::Vm => "vm",
            NodeType::Lxc => "lxc",
            NodeType::Container => "container",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a node. Only the cascade orchestrator writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Offline,
    Starting,
    Online,
    Stopping,
    Error,
}

impl NodeStatus {
    /// Statuses in which a node counts as a live dependent of something else.
    pub fn is_active(self) -> bool {
        matches!(self, NodeStatus::Online | NodeStatus::Starting)
    }

    /// `starting`/`stopping` only exist while a cascade holds the node.
    pub fn is_transitional(self) -> bool {
        matches!(self, NodeStatus::Starting | NodeStatus::Stopping)
    }
}

impl FromStr for NodeStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(NodeStatus::Offline),
            "starting" => Ok(NodeStatus::Starting),
            "online" => Ok(NodeStatus::Online),
            "stopping" => Ok(NodeStatus::Stopping),
            "error" => Ok(NodeStatus::Error),
            _ => Err(()),
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Offline => "offline",
            NodeStatus::Starting => "starting",
            NodeStatus::Online => "online",
            NodeStatus::Stopping => "stopping",
            NodeStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeType {
    Start,
    Stop,
}

impl FromStr for CascadeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(CascadeType::Start),
            "stop" => Ok(CascadeType::Stop),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CascadeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CascadeType::Start => "start",
            CascadeType::Stop => "stop",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl CascadeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CascadeStatus::Completed | CascadeStatus::Failed)
    }
}

impl FromStr for CascadeStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CascadeStatus::Pending),
            "in_progress" => Ok(CascadeStatus::InProgress),
            "completed" => Ok(CascadeStatus::Completed),
            "failed" => Ok(CascadeStatus::Failed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CascadeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CascadeStatus::Pending => "pending",
            CascadeStatus::InProgress => "in_progress",
            CascadeStatus::Completed => "completed",
            CascadeStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        })
    }
}
