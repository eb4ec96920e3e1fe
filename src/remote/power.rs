use std::time::Duration;
use thiserror::Error;
use tokio::{
    net::{TcpStream, UdpSocket},
    time::timeout,
};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PowerError {
    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),
    #[error("failed to send wake packet: {0}")]
    Io(#[from] std::io::Error),
}

pub fn parse_mac(raw: &str) -> Result<[u8; 6], PowerError> {
    let parts: Vec<&str> = raw.trim().split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(PowerError::InvalidMac(raw.to_string()));
    }

    let mut mac = [0u8; 6];
    for (byte, part) in mac.iter_mut().zip(parts) {
        *byte = u8::from_str_radix(part, 16).map_err(|_| PowerError::InvalidMac(raw.to_string()))?;
    }
    Ok(mac)
}

/// Six `0xFF` bytes followed by the target MAC repeated sixteen times.
pub fn magic_packet(mac: [u8; 6]) -> Vec<u8> {
    let mut packet = vec![0xFF; 6];
    for _ in 0..16 {
        packet.extend_from_slice(&mac);
    }
    packet
}

/// Broadcasts a wake-on-LAN packet for `mac` to `broadcast` (e.g. `255.255.255.255:9`).
pub async fn wake_on_lan(mac: &str, broadcast: &str) -> Result<(), PowerError> {
    let packet = magic_packet(parse_mac(mac)?);

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;
    socket.send_to(&packet, broadcast).await?;

    info!("Sent wake-on-LAN packet for {} to {}", mac, broadcast);
    Ok(())
}

/// Whether something accepts TCP connections on `address` within `limit`.
pub async fn is_reachable(address: &str, limit: Duration) -> bool {
    let reachable = matches!(timeout(limit, TcpStream::connect(address)).await, Ok(Ok(_)));
    debug!("{} reachable: {}", address, reachable);
    reachable
}
