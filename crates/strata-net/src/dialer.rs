//! Outbound connection establishment
//!
//! Dialing resolves the address stack, looks up DNS hosts, connects over TCP,
//! runs the client handshakes the stack asks for and hands the resulting
//! [`Connection`] to the upgrader.

use crate::connection::Connection;
use crate::error::TransportError;
use crate::handshake;
use crate::socket::LayeredSocket;
use crate::tls::ClientTlsConfig;
use crate::upgrader::{upgrade_error, Upgrader};
use crate::ws::WsConfig;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use strata_core::AddressStack;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;

/// Opens outbound connections
pub struct Dialer<U> {
    upgrader: Arc<U>,
    tls: ClientTlsConfig,
    ws: WsConfig,
}

impl<U> Clone for Dialer<U> {
    fn clone(&self) -> Self {
        Self {
            upgrader: Arc::clone(&self.upgrader),
            tls: self.tls.clone(),
            ws: self.ws,
        }
    }
}

impl<U: Upgrader> Dialer<U> {
    pub fn new(upgrader: Arc<U>, tls: ClientTlsConfig, ws: WsConfig) -> Self {
        Self { upgrader, tls, ws }
    }

    /// Whether `address` is something this dialer can reach
    pub fn can_dial(&self, address: &Multiaddr) -> bool {
        AddressStack::can_handle(address)
    }

    /// Dial `address`, expecting `peer` on the other end.
    ///
    /// `timeout` bounds name resolution, connecting and the layer handshakes;
    /// `Duration::ZERO` disables it. The upgrade runs without a deadline.
    pub async fn dial(
        &self,
        peer: PeerId,
        address: &Multiaddr,
        timeout: Duration,
    ) -> Result<U::Output, TransportError> {
        let stack = AddressStack::resolve(address)
            .ok_or_else(|| TransportError::AddressNotSupported(address.clone()))?;

        let establish = self.establish(&stack, address);
        let connection = if timeout.is_zero() {
            establish.await?
        } else {
            tokio::time::timeout(timeout, establish)
                .await
                .map_err(|_| TransportError::Timeout(timeout))??
        };

        self.upgrader
            .secure_outbound(connection, peer)
            .await
            .map_err(upgrade_error)
    }

    /// Dial on a spawned task and report the outcome to `on_complete` once.
    pub fn spawn_dial<F>(
        &self,
        peer: PeerId,
        address: Multiaddr,
        timeout: Duration,
        on_complete: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<U::Output, TransportError>) + Send + 'static,
    {
        let dialer = self.clone();
        tokio::spawn(async move {
            let result = dialer.dial(peer, &address, timeout).await;
            on_complete(result);
        })
    }

    async fn establish(
        &self,
        stack: &AddressStack,
        address: &Multiaddr,
    ) -> Result<Connection, TransportError> {
        let candidates = resolve_candidates(stack).await?;
        let stream = connect_any(&candidates).await?;
        stream.set_nodelay(true)?;
        let local = stack.to_address(stream.local_addr()?);

        let layer = handshake::client_layers(stream, stack, &self.tls, &self.ws).await?;
        Ok(Connection::new(
            LayeredSocket::new(layer),
            true,
            local,
            address.clone(),
        ))
    }
}

async fn resolve_candidates(stack: &AddressStack) -> Result<Vec<SocketAddr>, TransportError> {
    if let Some(endpoint) = stack.socket_addr() {
        return Ok(vec![endpoint]);
    }

    let found = tokio::net::lookup_host((stack.host.as_str(), stack.port))
        .await
        .map_err(TransportError::Resolve)?;
    let candidates: Vec<SocketAddr> = found
        .filter(|endpoint| stack.host_family.admits(&endpoint.ip()))
        .collect();
    if candidates.is_empty() {
        return Err(TransportError::Resolve(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {} address for {}", stack.host_family, stack.host),
        )));
    }
    debug!("Resolved {} to {:?}", stack.host, candidates);
    Ok(candidates)
}

async fn connect_any(candidates: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no candidate endpoints");
    for endpoint in candidates {
        match TcpStream::connect(endpoint).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connect to {} failed: {}", endpoint, e);
                last_err = e;
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrader::PassthroughUpgrader;
    use tokio::net::TcpListener;

    fn dialer() -> Dialer<PassthroughUpgrader> {
        Dialer::new(
            Arc::new(PassthroughUpgrader),
            ClientTlsConfig::accept_any_certificate(),
            WsConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unsupported_address_rejected() {
        let address: Multiaddr = "/ip4/127.0.0.1/udp/4000".parse().unwrap();
        let err = dialer()
            .dial(PeerId::random(), &address, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::AddressNotSupported(a) if a == address));
    }

    #[tokio::test]
    async fn test_spawn_dial_reports_once() {
        let address: Multiaddr = "/ip4/127.0.0.1/udp/4000".parse().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = dialer().spawn_dial(PeerId::random(), address, Duration::ZERO, move |result| {
            let _ = tx.send(result.is_err());
        });
        handle.await.unwrap();
        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_refused_connection_reports_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let address: Multiaddr = format!("/ip4/127.0.0.1/tcp/{port}").parse().unwrap();
        let err = dialer()
            .dial(PeerId::random(), &address, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)), "{err:?}");
    }

    async fn refused_endpoint() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        drop(listener);
        endpoint
    }

    #[tokio::test]
    async fn test_connect_any_skips_failed_candidates() {
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_endpoint = live.local_addr().unwrap();
        let refused = refused_endpoint().await;

        let stream = connect_any(&[refused, live_endpoint]).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), live_endpoint);
    }

    #[tokio::test]
    async fn test_connect_any_reports_last_error() {
        let first = refused_endpoint().await;
        let second = refused_endpoint().await;
        let err = connect_any(&[first, second]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);

        let err = connect_any(&[]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_dial_times_out_on_stalled_handshake() {
        // Accepts TCP but never answers the WebSocket upgrade
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _hold = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let address: Multiaddr = format!("/ip4/127.0.0.1/tcp/{port}/ws").parse().unwrap();
        let timeout = Duration::from_millis(200);
        let err = dialer()
            .dial(PeerId::random(), &address, timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(t) if t == timeout));
    }

    #[tokio::test]
    async fn test_dns_family_mismatch_fails_resolution() {
        // localhost never resolves to a v4 address through dns6
        let stack = AddressStack::resolve(&"/dns6/localhost/tcp/1".parse().unwrap()).unwrap();
        match resolve_candidates(&stack).await {
            Ok(found) => assert!(found.iter().all(|a| a.is_ipv6())),
            Err(e) => assert!(matches!(e, TransportError::Resolve(_))),
        }
    }
}
