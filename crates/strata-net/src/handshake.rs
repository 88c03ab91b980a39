//! Building a layer stack on a fresh TCP stream
//!
//! Layering order is fixed: TCP, then TLS for `wss`, then WebSocket framing
//! for `ws` or `wss`.

use crate::error::TransportError;
use crate::socket::Layer;
use crate::tls::{ClientTlsConfig, ServerTlsConfig};
use crate::ws::{self, WsConfig};
use std::io;
use strata_core::AddressStack;
use tokio::net::TcpStream;

/// Run the client side of every handshake `stack` asks for.
pub(crate) async fn client_layers(
    stream: TcpStream,
    stack: &AddressStack,
    tls: &ClientTlsConfig,
    ws_config: &WsConfig,
) -> Result<Layer, TransportError> {
    let mut layer = Layer::Plain(stream);
    if stack.wss {
        let secured = tls
            .connect(&stack.host, layer)
            .await
            .map_err(TransportError::Tls)?;
        layer = Layer::Encrypted(Box::new(secured));
    }
    if stack.is_framed() {
        let framed = ws::connect(layer, &stack.host, stack.port, ws_config).await?;
        layer = Layer::Framed(Box::new(framed));
    }
    Ok(layer)
}

/// Run the server side of every handshake `stack` asks for.
pub(crate) async fn server_layers(
    stream: TcpStream,
    stack: &AddressStack,
    tls: Option<&ServerTlsConfig>,
    ws_config: &WsConfig,
) -> Result<Layer, TransportError> {
    let mut layer = Layer::Plain(stream);
    if stack.wss {
        let tls = tls.ok_or_else(|| {
            TransportError::Tls(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no server TLS material configured",
            ))
        })?;
        let secured = tls.accept(layer).await.map_err(TransportError::Tls)?;
        layer = Layer::Encrypted(Box::new(secured));
    }
    if stack.is_framed() {
        let framed = ws::accept(layer, ws_config).await?;
        layer = Layer::Framed(Box::new(framed));
    }
    Ok(layer)
}
