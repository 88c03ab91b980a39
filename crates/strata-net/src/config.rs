//! Transport configuration
//!
//! Loaded from JSON. Every field has a default, so `{}` is a valid file.
//!
//! ```json
//! {
//!   "dial_timeout_ms": 10000,
//!   "handshake_timeout_ms": 10000,
//!   "server_pem": "/etc/strata/server.pem",
//!   "client_trust": { "pem": "/etc/strata/ca.pem" },
//!   "websocket": { "max_message_size": 67108864, "max_frame_size": 16777216 }
//! }
//! ```

use crate::tls::{ClientTlsConfig, ServerTlsConfig, TlsConfigError};
use crate::ws::WsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("TLS configuration error: {0}")]
    Tls(#[from] TlsConfigError),
}

/// How dialed `wss` servers are authenticated
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientTrust {
    /// Mozilla root set
    #[default]
    Webpki,
    /// Only the certificates in this PEM file
    Pem(PathBuf),
    /// Any certificate; identity is left to the upgrader
    AcceptAny,
}

/// Transport settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Establishment deadline for dials; 0 disables it
    pub dial_timeout_ms: u64,
    /// Deadline for inbound TLS and WebSocket handshakes; 0 disables it
    pub handshake_timeout_ms: u64,
    /// Certificate chain and key for `wss` listeners
    pub server_pem: Option<PathBuf>,
    pub client_trust: ClientTrust,
    pub websocket: WsConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
            server_pem: None,
            client_trust: ClientTrust::default(),
            websocket: WsConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Server TLS material, if configured
    pub fn server_tls(&self) -> Result<Option<ServerTlsConfig>, ConfigError> {
        self.server_pem
            .as_ref()
            .map(ServerTlsConfig::from_pem_file)
            .transpose()
            .map_err(ConfigError::from)
    }

    pub fn client_tls(&self) -> Result<ClientTlsConfig, ConfigError> {
        Ok(match &self.client_trust {
            ClientTrust::Webpki => ClientTlsConfig::webpki(),
            ClientTrust::Pem(pem) => {
                let raw = std::fs::read_to_string(pem)?;
                ClientTlsConfig::from_trusted_pem(&raw)?
            }
            ClientTrust::AcceptAny => ClientTlsConfig::accept_any_certificate(),
        })
    }
}
