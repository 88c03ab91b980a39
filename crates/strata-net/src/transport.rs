//! TCP transport facade
//!
//! Ties a dialer and listener factory to one upgrader and one set of TLS and
//! WebSocket settings.

use crate::config::{ConfigError, TransportConfig};
use crate::dialer::Dialer;
use crate::error::TransportError;
use crate::listener::{Listener, ListenerEvent, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::tls::{ClientTlsConfig, ServerTlsConfig};
use crate::upgrader::Upgrader;
use crate::ws::WsConfig;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use std::sync::Arc;
use std::time::Duration;
use strata_core::AddressStack;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Protocol identifier of this transport
pub const PROTOCOL_ID: &str = "/tcp/1.0.0";

/// TCP / WS / WSS transport
pub struct TcpTransport<U> {
    upgrader: Arc<U>,
    dialer: Dialer<U>,
    server_tls: Option<ServerTlsConfig>,
    ws: WsConfig,
    dial_timeout: Duration,
    handshake_timeout: Duration,
}

impl<U: Upgrader> TcpTransport<U> {
    pub fn new(
        upgrader: Arc<U>,
        client_tls: ClientTlsConfig,
        server_tls: Option<ServerTlsConfig>,
        ws: WsConfig,
    ) -> Self {
        Self {
            dialer: Dialer::new(Arc::clone(&upgrader), client_tls, ws),
            upgrader,
            server_tls,
            ws,
            dial_timeout: Duration::ZERO,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Build from loaded configuration
    pub fn from_config(upgrader: Arc<U>, config: &TransportConfig) -> Result<Self, ConfigError> {
        let transport = Self::new(
            upgrader,
            config.client_tls()?,
            config.server_tls()?,
            config.websocket,
        );
        Ok(transport
            .with_dial_timeout(config.dial_timeout())
            .with_handshake_timeout(config.handshake_timeout()))
    }

    /// Set the establishment deadline used by [`dial`](Self::dial)
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    /// Set the inbound handshake deadline applied to new listeners
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn protocol_id(&self) -> &'static str {
        PROTOCOL_ID
    }

    pub fn can_dial(&self, address: &Multiaddr) -> bool {
        AddressStack::can_handle(address)
    }

    pub async fn dial(&self, peer: PeerId, address: &Multiaddr) -> Result<U::Output, TransportError> {
        self.dialer.dial(peer, address, self.dial_timeout).await
    }

    pub fn spawn_dial<F>(&self, peer: PeerId, address: Multiaddr, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<U::Output, TransportError>) + Send + 'static,
    {
        self.dialer.spawn_dial(peer, address, self.dial_timeout, on_complete)
    }

    pub fn dialer(&self) -> &Dialer<U> {
        &self.dialer
    }

    /// A listener reporting inbound connections on `events`
    pub fn create_listener(&self, events: mpsc::UnboundedSender<ListenerEvent<U>>) -> Listener<U> {
        Listener::new(
            Arc::clone(&self.upgrader),
            self.server_tls.clone(),
            self.ws,
            events,
        )
        .with_handshake_timeout(self.handshake_timeout)
    }
}
