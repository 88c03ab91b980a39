//! Transport and connection errors

use multiaddr::Multiaddr;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while establishing connections or managing listeners
#[derive(Debug, Error)]
pub enum TransportError {
    /// The address is not a TCP/WS/WSS address this transport can use
    #[error("address not supported: {0}")]
    AddressNotSupported(Multiaddr),

    /// The listener is already bound
    #[error("already listening")]
    AlreadyConnected,

    /// The listener is not bound
    #[error("not listening")]
    NotListening,

    /// Name resolution failed or produced no usable address
    #[error("resolve error: {0}")]
    Resolve(io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS handshake failed: {0}")]
    Tls(io::Error),

    #[error("WebSocket handshake failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Establishment did not finish before the deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The upgrader rejected the connection
    #[error("upgrade failed: {0}")]
    Upgrade(Box<dyn std::error::Error + Send + Sync>),
}

/// Why a connection stopped being usable
///
/// The first reason recorded wins; later failures do not overwrite it.
#[derive(Clone, Debug, Error)]
pub enum ConnectionError {
    /// The peer finished its side of the stream
    #[error("end of stream")]
    Eof,

    /// The socket was shut down underneath the operation
    #[error("socket shut down")]
    Shutdown,

    /// The owner closed or dropped the connection
    #[error("connection aborted by local side")]
    AbortedByLocal,

    #[error("IO error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::Eof,
            io::ErrorKind::NotConnected => Self::Shutdown,
            _ => Self::Io(Arc::new(err)),
        }
    }
}

impl ConnectionError {
    /// Whether the error means the stream ended in an orderly way
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let eof: ConnectionError = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(eof.is_eof());

        let shutdown: ConnectionError = io::Error::from(io::ErrorKind::NotConnected).into();
        assert!(matches!(shutdown, ConnectionError::Shutdown));

        let reset: ConnectionError = io::Error::from(io::ErrorKind::ConnectionReset).into();
        match reset {
            ConnectionError::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transport_error_display() {
        let addr: Multiaddr = "/ip4/127.0.0.1/udp/1".parse().unwrap();
        let err = TransportError::AddressNotSupported(addr);
        assert_eq!(err.to_string(), "address not supported: /ip4/127.0.0.1/udp/1");
        assert_eq!(
            TransportError::Timeout(Duration::from_millis(250)).to_string(),
            "timed out after 250ms"
        );
    }
}
