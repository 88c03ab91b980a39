//! Layered TCP transport for strata
//!
//! This crate provides:
//! - Dialing and listening on `/tcp`, `/tcp/.../ws` and `/tcp/.../wss` multiaddrs
//! - TLS and WebSocket layering over TCP, behind one socket type
//! - Raw connections with ordered, lifetime-safe callbacks
//! - Hand-off of every new connection to a pluggable upgrader
//! - Varint length-prefixed framing

pub mod config;
pub mod connection;
pub mod dialer;
pub mod error;
pub mod framing;
mod handshake;
pub mod lifeline;
pub mod listener;
pub mod socket;
pub mod tls;
pub mod transport;
pub mod upgrader;
pub mod ws;

pub use config::{ClientTrust, ConfigError, TransportConfig};
pub use connection::Connection;
pub use dialer::Dialer;
pub use error::{ConnectionError, TransportError};
pub use framing::{FrameError, VarintFrameCodec};
pub use lifeline::{Lifeline, Observer};
pub use listener::{Listener, ListenerEvent, DEFAULT_HANDSHAKE_TIMEOUT};
pub use socket::{Layer, LayeredSocket};
pub use tls::{ClientTlsConfig, ServerTlsConfig, TlsConfigError};
pub use transport::{TcpTransport, PROTOCOL_ID};
pub use upgrader::{PassthroughUpgrader, Upgrader};
pub use ws::WsConfig;
