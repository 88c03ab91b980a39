//! strata-probe configuration

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strata_core::{AddressStack, Multiaddr, PeerId};
use strata_net::{ClientTrust, TransportConfig};

/// strata transport probe
#[derive(Parser, Debug, Clone)]
#[command(name = "strata-probe")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Transport configuration file (JSON)
    #[arg(long, env = "STRATA_TRANSPORT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// PEM file with certificate chain and private key for wss listeners
    #[arg(long, env = "STRATA_TLS_PEM", global = true)]
    pub tls_pem: Option<PathBuf>,

    /// Dial timeout in milliseconds (0 disables)
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Accept any server certificate when dialing wss
    #[arg(long, global = true)]
    pub accept_any_cert: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Listen and echo the first probe frame of every inbound connection
    Listen {
        /// Address to bind, e.g. /ip4/0.0.0.0/tcp/4001/ws
        address: Multiaddr,
    },
    /// Dial, send one probe frame and wait for the echo
    Dial {
        /// Address to dial, e.g. /dns4/example.com/tcp/443/wss/p2p/<peer-id>
        address: Multiaddr,

        /// Expected peer; defaults to the address's /p2p component
        #[arg(long)]
        peer: Option<PeerId>,

        /// Probe payload
        #[arg(long, default_value = "strata-probe")]
        message: String,
    },
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("Unknown log format: {}", self.log_format);
        }
        match &self.command {
            Command::Listen { address } => {
                if !AddressStack::can_handle(address) {
                    anyhow::bail!("Not a TCP/WS/WSS address: {}", address);
                }
            }
            Command::Dial { address, message, .. } => {
                if !AddressStack::can_handle(address) {
                    anyhow::bail!("Not a TCP/WS/WSS address: {}", address);
                }
                if message.is_empty() {
                    anyhow::bail!("Probe message cannot be empty");
                }
            }
        }
        Ok(())
    }

    /// Transport settings: the config file, if any, with command-line overrides
    pub fn transport_config(&self) -> anyhow::Result<TransportConfig> {
        let mut transport = match &self.config {
            Some(path) => TransportConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => TransportConfig::default(),
        };
        if let Some(pem) = &self.tls_pem {
            transport.server_pem = Some(pem.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            transport.dial_timeout_ms = timeout_ms;
        }
        if self.accept_any_cert {
            transport.client_trust = ClientTrust::AcceptAny;
        }
        Ok(transport)
    }
}

/// Peer to expect when dialing: `--peer`, else the address's `/p2p` suffix
pub fn dial_peer(address: &Multiaddr, peer: Option<PeerId>) -> anyhow::Result<PeerId> {
    peer.or_else(|| strata_core::peer_id(address))
        .context("No peer id: pass --peer or end the address with /p2p/<peer-id>")
}
