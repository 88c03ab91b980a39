//! Probe exchange
//!
//! The dialer sends one varint-framed probe and the listener echoes it back.

use bytes::{Bytes, BytesMut};
use std::time::{Duration, Instant};
use strata_net::{Connection, VarintFrameCodec};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;

/// Send one frame
pub async fn write_frame(conn: &Connection, payload: &[u8]) -> anyhow::Result<()> {
    let mut buf = BytesMut::new();
    VarintFrameCodec::new().encode(payload, &mut buf)?;
    conn.write(&buf).await?;
    Ok(())
}

/// Receive one frame. Bytes past the frame stay in `pending`.
pub async fn read_frame(conn: &Connection, pending: &mut BytesMut) -> anyhow::Result<Bytes> {
    let mut codec = VarintFrameCodec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some(frame) = codec.decode(pending)? {
            return Ok(frame);
        }
        let n = conn.read_some(&mut chunk).await?;
        pending.extend_from_slice(&chunk[..n]);
    }
}

/// Send `message` and wait for it to come back; returns the round-trip time.
pub async fn run_probe(conn: &Connection, message: &[u8]) -> anyhow::Result<Duration> {
    let started = Instant::now();
    write_frame(conn, message).await?;
    let echo = read_frame(conn, &mut BytesMut::new()).await?;
    anyhow::ensure!(
        echo.as_ref() == message,
        "Probe echo mismatch: sent {} bytes, got {}",
        message.len(),
        echo.len()
    );
    Ok(started.elapsed())
}

/// Echo the first probe frame of an inbound connection, then close it.
pub async fn serve_probe(conn: Connection) {
    let remote = conn.remote_address().clone();
    info!("Inbound connection from {}", remote);

    let frame = match read_frame(&conn, &mut BytesMut::new()).await {
        Ok(frame) => frame,
        Err(e) => {
            warn!("No probe from {}: {}", remote, e);
            return;
        }
    };
    info!(
        "Probe from {}: {:?}",
        remote,
        String::from_utf8_lossy(&frame[..frame.len().min(64)])
    );

    if let Err(e) = write_frame(&conn, &frame).await {
        warn!("Failed to echo probe to {}: {}", remote, e);
        return;
    }
    debug!("Echoed {} bytes to {}", frame.len(), remote);
}
