//! Tag-correlated request/response handling over one UDP socket.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, TransportError};
use crate::protocol::{build_request, parse_response, Command, Response};
use crate::types::Tag;
use crate::MAX_DATAGRAM_SIZE;

use super::ConnectionConfig;

type PendingTable = DashMap<Tag, PendingRequest>;

/// A request that has been transmitted and is awaiting its reply.
///
/// Owned exclusively by the connection: created on send, removed when the
/// matching reply arrives, the caller's timeout fires, or the connection is
/// torn down.
struct PendingRequest {
    waiter: oneshot::Sender<Vec<Response>>,
    created_at: Instant,
}

/// State held only while connected.
struct Active {
    socket: Arc<UdpSocket>,
    recv_task: JoinHandle<()>,
}

/// A logical connection to one PBus device.
///
/// Many caller tasks may have requests outstanding concurrently; each gets
/// its own tag and its own waiter, so replies resolve in whatever order they
/// arrive without callers blocking one another. The socket is owned by the
/// connection; callers never touch it directly.
pub struct Connection {
    config: ConnectionConfig,
    remote: SocketAddr,
    pending: Arc<PendingTable>,
    rng: Mutex<StdRng>,
    state: RwLock<Option<Active>>,
}

impl Connection {
    /// Create a disconnected connection toward the configured device.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a connection with a seeded tag RNG, for deterministic tests.
    pub fn with_seed(config: ConnectionConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: ConnectionConfig, rng: StdRng) -> Self {
        let remote = SocketAddr::new(config.host, config.port);
        Self {
            config,
            remote,
            pending: Arc::new(DashMap::new()),
            rng: Mutex::new(rng),
            state: RwLock::new(None),
        }
    }

    /// The device address this connection targets.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().is_some()
    }

    /// Number of requests currently awaiting a reply. Diagnostics only.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Local address of the bound socket, when connected.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let state = self.state.read();
        let active = state.as_ref().ok_or(Error::NotConnected)?;
        active
            .socket
            .local_addr()
            .map_err(|e| TransportError::SocketError(e.to_string()).into())
    }

    /// Bind the socket and start the receive task. Idempotent: connecting an
    /// already-connected instance is a no-op.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            debug!(remote = %self.remote, "already connected");
            return Ok(());
        }

        let bind: SocketAddr = if self.remote.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| TransportError::BindFailed {
                addr: bind,
                reason: e.to_string(),
            })?;

        socket
            .connect(self.remote)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                addr: self.remote,
                reason: e.to_string(),
            })?;

        let socket = Arc::new(socket);
        let recv_task = tokio::spawn(recv_loop(
            Arc::clone(&socket),
            Arc::clone(&self.pending),
        ));

        let mut state = self.state.write();
        if state.is_some() {
            // Lost a connect race; keep the established endpoint.
            recv_task.abort();
            return Ok(());
        }
        *state = Some(Active { socket, recv_task });
        drop(state);

        info!(remote = %self.remote, "connected");
        Ok(())
    }

    /// Stop the receive task, cancel every pending waiter, and release the
    /// socket. No-op when already disconnected.
    pub fn disconnect(&self) {
        let Some(active) = self.state.write().take() else {
            return;
        };

        active.recv_task.abort();

        // Dropping the senders resolves every waiter with `Error::Cancelled`.
        let cancelled = self.pending.len();
        self.pending.clear();

        info!(remote = %self.remote, cancelled, "disconnected");
    }

    /// Send a command batch and await the correlated reply.
    ///
    /// Responses align positionally with `commands`; individual records may
    /// be NAKs, so callers check [`Response::is_nak`] per record. Fails with
    /// [`Error::NotConnected`] when disconnected, [`Error::Timeout`] when no
    /// reply correlates within the deadline (the pending entry is removed
    /// before returning), and [`Error::Cancelled`] if the connection is torn
    /// down mid-flight. A reply for a different tag never affects this call.
    pub async fn send_request(
        &self,
        commands: &[Command],
        timeout: Option<Duration>,
    ) -> Result<Vec<Response>> {
        let socket = {
            let state = self.state.read();
            match state.as_ref() {
                Some(active) => Arc::clone(&active.socket),
                None => return Err(Error::NotConnected),
            }
        };
        let timeout = timeout.unwrap_or(self.config.timeout);

        let (tx, rx) = oneshot::channel();
        let tag = {
            let mut rng = self.rng.lock();
            register_waiter(&mut *rng, &self.pending, tx)
        };

        let frame = build_request(tag, commands);
        debug!(%tag, commands = commands.len(), bytes = frame.len(), "sending request");

        if let Err(err) = socket.send(&frame).await {
            self.pending.remove(&tag);
            return Err(TransportError::SendFailed(err.to_string()).into());
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(responses)) => {
                debug!(%tag, responses = responses.len(), "request resolved");
                Ok(responses)
            }
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => {
                self.pending.remove(&tag);
                warn!(%tag, ?timeout, "request timed out");
                Err(Error::Timeout)
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(active) = self.state.write().take() {
            active.recv_task.abort();
        }
    }
}

/// Draw a tag unique against the live pending set and register the waiter
/// under it, as one step. Collisions redraw; the vacant-entry insert keeps
/// allocation and registration atomic with respect to the receive path.
fn register_waiter<R: RngCore>(
    rng: &mut R,
    pending: &PendingTable,
    waiter: oneshot::Sender<Vec<Response>>,
) -> Tag {
    let slot = loop {
        let candidate = Tag::generate_with(rng);
        match pending.entry(candidate) {
            Entry::Occupied(_) => {
                debug!(tag = %candidate, "tag collision with pending request, redrawing");
            }
            Entry::Vacant(slot) => break slot,
        }
    };
    let tag = *slot.key();
    slot.insert(PendingRequest {
        waiter,
        created_at: Instant::now(),
    });
    tag
}

/// Receive path: parse each inbound datagram and resolve the waiter for its
/// tag. Unsolicited and malformed datagrams are logged and dropped; nothing
/// on this path is ever surfaced to an unrelated caller.
async fn recv_loop(socket: Arc<UdpSocket>, pending: Arc<PendingTable>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let len = match socket.recv(&mut buf).await {
            Ok(len) => len,
            Err(err) => {
                // Connected UDP sockets report ICMP errors here; keep serving.
                warn!(%err, "receive failed");
                continue;
            }
        };

        match parse_response(&buf[..len]) {
            Ok((tag, responses)) => match pending.remove(&tag) {
                Some((_, request)) => {
                    debug!(
                        %tag,
                        elapsed = ?request.created_at.elapsed(),
                        "reply correlated"
                    );
                    // The waiter may have timed out between lookup and send.
                    let _ = request.waiter.send(responses);
                }
                None => warn!(%tag, "reply with no pending request"),
            },
            Err(err) => debug!(%err, bytes = len, "discarding unparseable datagram"),
        }
    }
}
