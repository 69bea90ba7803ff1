//! Broadcast device discovery.
//!
//! Discovery is stateless: one request goes to the broadcast address from an
//! ephemeral socket, and every parseable reply arriving within the window is
//! collected. Replies are keyed by sender address rather than by tag, since
//! every device answers the same broadcast tag.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::protocol::{build_request, parse_response, Command, Response};
use crate::types::Tag;
use crate::{BROADCAST_ADDRESS, DEFAULT_PORT, MAX_DATAGRAM_SIZE};

/// Discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Where the request is sent. Defaults to the limited broadcast address
    /// on the device port; tests point it at a specific endpoint.
    #[serde(default = "default_target")]
    pub target: SocketAddr,

    /// How long to collect replies. The full window is always waited out;
    /// discovery does not stop at the first responder.
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,
}

fn default_target() -> SocketAddr {
    SocketAddr::new(BROADCAST_ADDRESS.into(), DEFAULT_PORT)
}

fn default_window() -> Duration {
    Duration::from_secs(5)
}

impl DiscoveryConfig {
    pub fn new(target: SocketAddr, window: Duration) -> Self {
        Self { target, window }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            window: default_window(),
        }
    }
}

/// Broadcast a command batch and collect replies from every device that
/// answers within the window.
///
/// Devices replying with unparseable datagrams are excluded. An empty map
/// means nothing was found; socket failures are logged and yield whatever
/// was collected up to that point, never an error.
pub async fn discover(
    commands: &[Command],
    config: &DiscoveryConfig,
) -> HashMap<SocketAddr, Vec<Response>> {
    let mut found = HashMap::new();
    if let Err(err) = collect_replies(commands, config, &mut found).await {
        warn!(%err, "discovery aborted");
    }
    info!(devices = found.len(), "discovery window closed");
    found
}

async fn collect_replies(
    commands: &[Command],
    config: &DiscoveryConfig,
    found: &mut HashMap<SocketAddr, Vec<Response>>,
) -> Result<()> {
    let bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
    let socket = UdpSocket::bind(bind)
        .await
        .map_err(|e| TransportError::BindFailed {
            addr: bind,
            reason: e.to_string(),
        })?;
    socket
        .set_broadcast(true)
        .map_err(|e| TransportError::SocketError(e.to_string()))?;

    let tag = Tag::generate();
    let frame = build_request(tag, commands);
    socket
        .send_to(&frame, config.target)
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    debug!(target = %config.target, %tag, "discovery request sent");

    let deadline = Instant::now() + config.window;
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let (len, peer) = match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Err(err)) => {
                return Err(TransportError::ReceiveFailed(err.to_string()).into());
            }
            Ok(Ok(received)) => received,
        };

        match parse_response(&buf[..len]) {
            Ok((_, responses)) => {
                debug!(%peer, responses = responses.len(), "discovery reply");
                found.insert(peer, responses);
            }
            Err(err) => debug!(%peer, %err, "ignoring unparseable discovery reply"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets_broadcast() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.target.port(), DEFAULT_PORT);
        assert_eq!(config.target.ip(), std::net::IpAddr::V4(Ipv4Addr::BROADCAST));
        assert_eq!(config.window, Duration::from_secs(5));
    }
}
