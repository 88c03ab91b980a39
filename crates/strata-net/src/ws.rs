//! WebSocket framing as a byte stream
//!
//! Each write goes out as one binary message. Reads hand back message
//! payloads, keeping whatever did not fit in the caller's buffer for the next
//! read. Control frames are consumed here and a close frame reads as end of
//! stream.

use futures_util::{Sink, Stream};
use serde::{Deserialize, Serialize};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::{accept_async_with_config, client_async_with_config, WebSocketStream};
use tracing::{debug, trace};

/// Largest payload sent in one binary message
const MAX_WRITE_CHUNK: usize = 64 * 1024;

/// WebSocket limits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Largest message accepted from the peer
    pub max_message_size: usize,
    /// Largest single frame accepted from the peer
    pub max_frame_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 << 20,
            max_frame_size: 16 << 20,
        }
    }
}

impl WsConfig {
    fn protocol_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_frame_size);
        config
    }
}

/// Run the client side of the opening handshake over `inner`.
pub async fn connect<S>(
    inner: S,
    host: &str,
    port: u16,
    config: &WsConfig,
) -> Result<FramedStream<S>, WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let url = if host.contains(':') {
        format!("ws://[{}]:{}/", host, port)
    } else {
        format!("ws://{}:{}/", host, port)
    };
    let (stream, _response) =
        client_async_with_config(url, inner, Some(config.protocol_config())).await?;
    debug!("WebSocket client handshake with {}:{} complete", host, port);
    Ok(FramedStream::new(stream, config))
}

/// Run the server side of the opening handshake over `inner`.
pub async fn accept<S>(inner: S, config: &WsConfig) -> Result<FramedStream<S>, WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let stream = accept_async_with_config(inner, Some(config.protocol_config())).await?;
    debug!("WebSocket server handshake complete");
    Ok(FramedStream::new(stream, config))
}

/// A WebSocket connection read and written as a byte stream
pub struct FramedStream<S> {
    inner: WebSocketStream<S>,
    read_buf: Vec<u8>,
    read_pos: usize,
    closed: bool,
    write_chunk: usize,
}

impl<S> FramedStream<S> {
    fn new(inner: WebSocketStream<S>, config: &WsConfig) -> Self {
        Self {
            inner,
            read_buf: Vec::new(),
            read_pos: 0,
            closed: false,
            write_chunk: MAX_WRITE_CHUNK.min(config.max_frame_size).max(1),
        }
    }

    fn buffered(&self) -> usize {
        self.read_buf.len() - self.read_pos
    }
}

fn read_error(err: WsError) -> io::Error {
    match err {
        WsError::Io(err) => err,
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            io::ErrorKind::UnexpectedEof.into()
        }
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

fn write_error(err: WsError) -> io::Error {
    match err {
        WsError::Io(err) => err,
        WsError::ConnectionClosed | WsError::AlreadyClosed => io::ErrorKind::BrokenPipe.into(),
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

impl<S> AsyncRead for FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if self.buffered() > 0 {
                let this = &mut *self;
                let remaining = &this.read_buf[this.read_pos..];
                let n = remaining.len().min(buf.remaining());
                buf.put_slice(&remaining[..n]);
                this.read_pos += n;
                if this.read_pos == this.read_buf.len() {
                    this.read_buf.clear();
                    this.read_pos = 0;
                }
                return Poll::Ready(Ok(()));
            }

            if self.closed {
                return Poll::Ready(Ok(()));
            }

            let message = match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(message)) => message,
                Some(Err(err)) => {
                    self.closed = true;
                    let err = read_error(err);
                    if err.kind() == io::ErrorKind::UnexpectedEof {
                        trace!("WebSocket peer went away without closing");
                    }
                    return Poll::Ready(Err(err));
                }
                None => {
                    self.closed = true;
                    continue;
                }
            };

            match message {
                Message::Binary(data) => {
                    trace!("WebSocket received {} bytes", data.len());
                    self.read_buf = data;
                    self.read_pos = 0;
                }
                Message::Text(text) => {
                    debug!("WebSocket received {} byte text message", text.len());
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "unexpected text message",
                    )));
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(frame) => {
                    debug!("WebSocket received close frame: {:?}", frame);
                    self.closed = true;
                }
                Message::Frame(_) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "unexpected raw frame",
                    )));
                }
            }
        }
    }
}

impl<S> AsyncWrite for FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        ready!(Pin::new(&mut self.inner).poll_ready(cx)).map_err(write_error)?;
        let n = buf.len().min(self.write_chunk);
        Pin::new(&mut self.inner)
            .start_send(Message::Binary(buf[..n].to_vec()))
            .map_err(write_error)?;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx).map_err(write_error)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match ready!(Pin::new(&mut self.inner).poll_close(cx)) {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Poll::Ready(Ok(())),
            Err(err) => Poll::Ready(Err(write_error(err))),
        }
    }
}
