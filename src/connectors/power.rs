use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{wol, PlatformApi, PowerController, ProviderError, ReachabilityProbe, RemoteExecutor};
use crate::db::entities::node;
use crate::db::store::Store;

const SHUTDOWN_COMMAND: &str = "sudo shutdown -h now";

/// Picks the power primitive from the node's capability descriptors:
///
/// - resources hosted by a platform node (parent with a platform API and a
///   `platform_ref`) go through [`PlatformApi`];
/// - physical nodes are woken with Wake-on-LAN and stopped over SSH.
///
/// Readiness is confirmed by polling TCP reachability when the node has an
/// address.
pub struct DefaultPowerController {
    store: Arc<dyn Store>,
    probe: Arc<dyn ReachabilityProbe>,
    remote: Option<Arc<dyn RemoteExecutor>>,
    platform: Option<Arc<dyn PlatformApi>>,
    confirm_timeout: Duration,
    poll_interval: Duration,
    probe_timeout: Duration,
}

impl DefaultPowerController {
    pub fn new(
        store: Arc<dyn Store>,
        probe: Arc<dyn ReachabilityProbe>,
        confirm_timeout: Duration,
        poll_interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            store,
            probe,
            remote: None,
            platform: None,
            confirm_timeout,
            poll_interval,
            probe_timeout,
        }
    }

    pub fn with_remote_executor(mut self, remote: Arc<dyn RemoteExecutor>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_platform_api(mut self, platform: Arc<dyn PlatformApi>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// The platform host managing `node`, if any.
    async fn platform_host(&self, node: &node::Model) -> Result<Option<node::Model>, ProviderError> {
        let (Some(parent_id), Some(_)) = (node.parent_id, node.platform_ref.as_ref()) else {
            return Ok(None);
        };
        let parent = self
            .store
            .get_node(parent_id)
            .await
            .map_err(|e| ProviderError::Platform(e.to_string()))?;
        Ok(parent.filter(|p| p.is_platform_host()))
    }

    fn platform_api(&self) -> Result<&Arc<dyn PlatformApi>, ProviderError> {
        self.platform
            .as_ref()
            .ok_or_else(|| ProviderError::Unsupported("no platform API connector configured".into()))
    }

    /// Polls until reachability equals `want`. Nodes without an address are
    /// taken at the primitive's word.
    async fn confirm(&self, node: &node::Model, want: bool) -> Result<(), ProviderError> {
        let Some(target) = node.probe_target() else {
            debug!(node = %node.name, "No address to confirm against; trusting the power primitive.");
            return Ok(());
        };
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            if self.probe.probe_reachable(&target, self.probe_timeout).await == want {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ProviderError::Timeout(self.confirm_timeout));
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl PowerController for DefaultPowerController {
    async fn power_on(&self, node: &node::Model) -> Result<(), ProviderError> {
        if let Some(host) = self.platform_host(node).await? {
            info!(node = %node.name, host = %host.name, "Starting resource through platform API.");
            self.platform_api()?.start_resource(&host, node).await?;
        } else if let Some(wol_cap) = &node.capabilities.wol {
            info!(node = %node.name, "Sending Wake-on-LAN.");
            wol::send_magic_packet(wol_cap).await?;
        } else {
            return Err(ProviderError::MissingCapability {
                node: node.name.clone(),
                capability: "Wake-on-LAN or platform API",
            });
        }
        self.confirm(node, true).await
    }

    async fn power_off(&self, node: &node::Model) -> Result<(), ProviderError> {
        if let Some(host) = self.platform_host(node).await? {
            info!(node = %node.name, host = %host.name, "Stopping resource through platform API.");
            self.platform_api()?.stop_resource(&host, node).await?;
        } else if node.capabilities.ssh.is_some() {
            let remote = self
                .remote
                .as_ref()
                .ok_or_else(|| ProviderError::Unsupported("no SSH connector configured".into()))?;
            // The session usually drops mid-command; confirmation below is
            // what decides success.
            match remote.exec_remote(node, SHUTDOWN_COMMAND).await {
                Ok(out) if out.exit_code != 0 => {
                    warn!(node = %node.name, exit_code = out.exit_code, stderr = %out.stderr, "Shutdown command returned non-zero.");
                }
                Ok(_) => {}
                Err(e) => debug!(node = %node.name, error = %e, "Shutdown session ended with error."),
            }
        } else {
            return Err(ProviderError::MissingCapability {
                node: node.name.clone(),
                capability: "SSH or platform API",
            });
        }
        self.confirm(node, false).await
    }
}
