use std::net::{Ipv4Addr, SocketAddrV4};

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use super::ProviderError;
use crate::db::entities::node::WolCapability;

pub fn parse_mac(mac: &str) -> Result<[u8; 6], ProviderError> {
    let hex: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if hex.len() != 12 {
        return Err(ProviderError::InvalidConfig(format!("bad MAC address '{mac}'")));
    }
    let mut out = [0u8; 6];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| ProviderError::InvalidConfig(format!("bad MAC address '{mac}'")))?;
    }
    Ok(out)
}

/// 6 x 0xFF followed by the MAC repeated 16 times.
pub fn magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut pkt = [0xFFu8; 102];
    for chunk in pkt[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    pkt
}

fn broadcast_address(hint: Option<&str>) -> Ipv4Addr {
    hint.and_then(|s| s.parse::<Ipv4Addr>().ok())
        .unwrap_or(Ipv4Addr::BROADCAST)
}

/// Broadcasts the magic packet on UDP ports 9 and 7. Succeeds if at least
/// one send went out.
pub async fn send_magic_packet(wol: &WolCapability) -> Result<(), ProviderError> {
    let pkt = magic_packet(parse_mac(&wol.mac_address)?);
    let bcast = broadcast_address(wol.broadcast_address.as_deref());

    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    sock.set_broadcast(true)?;

    let mut sent = false;
    for port in [9u16, 7u16] {
        match sock.send_to(&pkt, SocketAddrV4::new(bcast, port)).await {
            Ok(_) => sent = true,
            Err(e) => warn!(broadcast = %bcast, port, error = %e, "Wake-on-LAN send failed."),
        }
    }
    if sent {
        debug!(mac = %wol.mac_address, broadcast = %bcast, "Wake-on-LAN packet sent.");
        Ok(())
    } else {
        Err(ProviderError::Unsupported(format!(
            "could not send Wake-on-LAN packet to {bcast}"
        )))
    }
}
