//! strata-probe - dial or listen on a strata transport address
//!
//! `listen` accepts connections and echoes the first varint-framed message of
//! each one. `dial` connects, sends a probe and reports the round-trip time.

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use strata_net::{PassthroughUpgrader, TcpTransport};
use strata_probe::config::{dial_peer, Command, Config};
use strata_probe::probe::{run_probe, serve_probe};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("strata_probe=info,strata_net=info"));
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    info!("strata-probe v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let transport_config = config.transport_config()?;
    let transport = TcpTransport::from_config(Arc::new(PassthroughUpgrader), &transport_config)
        .context("Failed to set up transport")?;

    match config.command {
        Command::Listen { address } => {
            let (tx, mut events) = mpsc::unbounded_channel();
            let listener = transport.create_listener(tx);
            listener.listen(&address)?;
            let bound = listener.listen_address()?;
            println!("{}", bound);
            info!("Listening on {}", bound);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received shutdown signal");
                        break;
                    }
                    event = events.recv() => match event {
                        Some(Ok(conn)) => {
                            tokio::spawn(serve_probe(conn));
                        }
                        Some(Err(e)) => warn!("Inbound connection failed: {}", e),
                        None => break,
                    },
                }
            }
            listener.close();
        }
        Command::Dial { address, peer, message } => {
            let peer = dial_peer(&address, peer)?;
            let conn = transport
                .dial(peer, &address)
                .await
                .with_context(|| format!("Failed to dial {}", address))?;
            println!("connected {} -> {}", conn.local_address(), conn.remote_address());

            let rtt = run_probe(&conn, message.as_bytes()).await?;
            println!("echo {} bytes in {:?}", message.len(), rtt);
            conn.close();
        }
    }
    Ok(())
}
