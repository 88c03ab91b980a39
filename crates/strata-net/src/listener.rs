//! Inbound connection acceptance
//!
//! A [`Listener`] binds one TCP/WS/WSS address and runs an accept loop.
//! Each accepted socket is handled on its own task, so a slow or broken peer
//! never holds up the loop. Upgrade outcomes and accept errors are sent on
//! the listener's event channel.

use crate::connection::Connection;
use crate::error::TransportError;
use crate::handshake;
use crate::socket::LayeredSocket;
use crate::tls::ServerTlsConfig;
use crate::upgrader::{upgrade_error, Upgrader};
use crate::ws::WsConfig;
use multiaddr::Multiaddr;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use strata_core::AddressStack;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Listener event: an upgraded inbound connection or an accept failure
pub type ListenerEvent<U> = Result<<U as Upgrader>::Output, TransportError>;

const BACKLOG: u32 = 1024;

/// Default deadline for the server-side TLS and WebSocket handshakes
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause between failed accepts, doubling up to a cap
#[derive(Debug)]
struct AcceptBackoff {
    delay: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        Self {
            delay: ACCEPT_BACKOFF_MIN,
        }
    }

    fn failed(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay * 2).min(ACCEPT_BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.delay = ACCEPT_BACKOFF_MIN;
    }
}

struct Bound {
    address: Multiaddr,
    shutdown: CancellationToken,
}

/// State shared with the accept loop and per-connection tasks
struct Inbound<U: Upgrader> {
    upgrader: Arc<U>,
    tls: Option<ServerTlsConfig>,
    ws: WsConfig,
    events: mpsc::UnboundedSender<ListenerEvent<U>>,
}

/// Accepts inbound connections on one address at a time
pub struct Listener<U: Upgrader> {
    inbound: Arc<Inbound<U>>,
    bound: Mutex<Option<Bound>>,
    handshake_timeout: Duration,
}

impl<U: Upgrader> Listener<U> {
    pub fn new(
        upgrader: Arc<U>,
        tls: Option<ServerTlsConfig>,
        ws: WsConfig,
        events: mpsc::UnboundedSender<ListenerEvent<U>>,
    ) -> Self {
        Self {
            inbound: Arc::new(Inbound {
                upgrader,
                tls,
                ws,
                events,
            }),
            bound: Mutex::new(None),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Deadline for each inbound TLS and WebSocket handshake;
    /// `Duration::ZERO` disables it.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Whether `address` is something this listener could bind
    pub fn can_listen(&self, address: &Multiaddr) -> bool {
        self.bindable(address).is_some()
    }

    fn bindable(&self, address: &Multiaddr) -> Option<(AddressStack, SocketAddr)> {
        let stack = AddressStack::resolve(address)?;
        let endpoint = stack.socket_addr()?;
        if stack.wss && self.inbound.tls.is_none() {
            return None;
        }
        Some((stack, endpoint))
    }

    /// Bind `address` and start accepting.
    ///
    /// The host must be a literal IP, and `wss` needs server TLS material.
    /// Must be called from within a Tokio runtime.
    pub fn listen(&self, address: &Multiaddr) -> Result<(), TransportError> {
        let (stack, endpoint) = self
            .bindable(address)
            .ok_or_else(|| TransportError::AddressNotSupported(address.clone()))?;

        let mut bound = self.bound.lock();
        if bound.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let socket = if endpoint.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(endpoint)?;
        let listener = socket.listen(BACKLOG)?;

        let local = stack.to_address(listener.local_addr()?);
        let shutdown = CancellationToken::new();
        info!("Listening on {}", local);

        tokio::spawn(accept_loop(
            listener,
            stack,
            local.clone(),
            Arc::clone(&self.inbound),
            self.handshake_timeout,
            shutdown.clone(),
        ));
        *bound = Some(Bound {
            address: local,
            shutdown,
        });
        Ok(())
    }

    /// The concrete bound address, with wildcard hosts and port 0 as
    /// reported by the OS
    pub fn listen_address(&self) -> Result<Multiaddr, TransportError> {
        self.bound
            .lock()
            .as_ref()
            .map(|bound| bound.address.clone())
            .ok_or(TransportError::NotListening)
    }

    /// True before `listen` and after `close`
    pub fn is_closed(&self) -> bool {
        self.bound.lock().is_none()
    }

    /// Stop accepting. Handshakes still in progress are abandoned;
    /// connections already handed off are untouched.
    pub fn close(&self) {
        if let Some(bound) = self.bound.lock().take() {
            info!("Closing listener on {}", bound.address);
            bound.shutdown.cancel();
        }
    }
}

impl<U: Upgrader> Drop for Listener<U> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_loop<U: Upgrader>(
    listener: TcpListener,
    stack: AddressStack,
    local: Multiaddr,
    inbound: Arc<Inbound<U>>,
    handshake_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut backoff = AcceptBackoff::new();
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => result,
        };
        match accepted {
            Ok((stream, peer)) => {
                backoff.reset();
                debug!("Accepted connection from {} on {}", peer, local);
                tokio::spawn(handle_inbound(
                    stream,
                    peer,
                    stack.clone(),
                    local.clone(),
                    Arc::clone(&inbound),
                    handshake_timeout,
                    shutdown.clone(),
                ));
            }
            Err(e) => {
                let delay = backoff.failed();
                warn!("Accept error on {}: {} (retrying in {:?})", local, e, delay);
                let _ = inbound.events.send(Err(TransportError::Io(e)));
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    debug!("Accept loop on {} stopped", local);
}

async fn handle_inbound<U: Upgrader>(
    stream: TcpStream,
    peer: SocketAddr,
    stack: AddressStack,
    listen_address: Multiaddr,
    inbound: Arc<Inbound<U>>,
    handshake_timeout: Duration,
    shutdown: CancellationToken,
) {
    let remote = stack.to_address(peer);
    let local = stream
        .local_addr()
        .map(|endpoint| stack.to_address(endpoint))
        .unwrap_or(listen_address);
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", remote, e);
    }

    let handshake = handshake::server_layers(stream, &stack, inbound.tls.as_ref(), &inbound.ws);
    let outcome = tokio::select! {
        _ = shutdown.cancelled() => {
            debug!("Listener closed during handshake with {}", remote);
            return;
        }
        outcome = async {
            if handshake_timeout.is_zero() {
                handshake.await
            } else {
                tokio::time::timeout(handshake_timeout, handshake)
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Timeout(handshake_timeout)))
            }
        } => outcome,
    };
    let layer = match outcome {
        Ok(layer) => layer,
        Err(e) => {
            debug!("Dropping inbound connection from {}: {}", remote, e);
            return;
        }
    };

    let connection = Connection::new(LayeredSocket::new(layer), false, local, remote);
    let result = inbound
        .upgrader
        .secure_inbound(connection)
        .await
        .map_err(upgrade_error);
    let _ = inbound.events.send(result);
}
