use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use super::ReachabilityProbe;

/// Reachability by TCP connect.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe_reachable(&self, address: &str, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(address = %address, error = %e, "TCP probe failed.");
                false
            }
            Err(_) => {
                debug!(address = %address, "TCP probe timed out.");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(TcpProbe.probe_reachable(&addr, Duration::from_secs(1)).await);

        drop(listener);
        assert!(!TcpProbe.probe_reachable(&addr, Duration::from_secs(1)).await);
    }
}
