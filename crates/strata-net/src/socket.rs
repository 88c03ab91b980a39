//! Layered sockets
//!
//! A [`Layer`] is one of a closed set of stream kinds stacked on a TCP
//! connection: plain TCP, TLS over a layer, or WebSocket framing over a layer.
//! [`LayeredSocket`] puts a stack behind a single read/write/close contract
//! usable from concurrent tasks.

use crate::ws::FramedStream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// One layer of a socket stack
pub enum Layer {
    Plain(TcpStream),
    Encrypted(Box<tokio_rustls::TlsStream<Layer>>),
    Framed(Box<FramedStream<Layer>>),
}

impl Layer {
    /// Short name of the outermost layer
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain(_) => "tcp",
            Self::Encrypted(_) => "tls",
            Self::Framed(_) => "ws",
        }
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Layer").field(&self.name()).finish()
    }
}

macro_rules! dispatch {
    ($self:ident, $stream:ident => $body:expr) => {
        match $self.get_mut() {
            Layer::Plain($stream) => $body,
            Layer::Encrypted($stream) => $body,
            Layer::Framed($stream) => $body,
        }
    };
}

impl AsyncRead for Layer {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        dispatch!(self, s => Pin::new(s).poll_read(cx, buf))
    }
}

impl AsyncWrite for Layer {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        dispatch!(self, s => Pin::new(s).poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        dispatch!(self, s => Pin::new(s).poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        dispatch!(self, s => Pin::new(s).poll_shutdown(cx))
    }
}

/// A layer stack with independent read and write sides
///
/// Once closed, reads fail with `UnexpectedEof` and writes with
/// `NotConnected`, after yielding to the scheduler. Operations in flight when
/// the socket closes fail with `ConnectionAborted`.
pub struct LayeredSocket {
    reader: Mutex<Option<ReadHalf<Layer>>>,
    writer: Mutex<Option<WriteHalf<Layer>>>,
    shutdown: CancellationToken,
    executor: Handle,
    kind: &'static str,
}

impl LayeredSocket {
    /// Wrap a stack. Must be called from within a Tokio runtime.
    pub fn new(layer: Layer) -> Self {
        Self::with_executor(layer, Handle::current())
    }

    pub fn with_executor(layer: Layer, executor: Handle) -> Self {
        let kind = layer.name();
        let (reader, writer) = tokio::io::split(layer);
        Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            shutdown: CancellationToken::new(),
            executor,
            kind,
        }
    }

    /// Runtime that owns this socket's work
    pub fn executor(&self) -> &Handle {
        &self.executor
    }

    /// Name of the outermost layer
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Read at least one byte into `buf`; `Ok(0)` means end of stream.
    pub async fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.reader.lock().await;
        let outcome = {
            let Some(reader) = guard.as_mut().filter(|_| !self.shutdown.is_cancelled()) else {
                tokio::task::yield_now().await;
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "socket closed"));
            };
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                result = reader.read(buf) => Some(result),
            }
        };
        match outcome {
            Some(result) => result,
            None => {
                guard.take();
                Err(aborted())
            }
        }
    }

    /// Write part of `buf` and flush it through every layer.
    pub async fn write_some(&self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.writer.lock().await;
        let outcome = {
            let Some(writer) = guard.as_mut().filter(|_| !self.shutdown.is_cancelled()) else {
                tokio::task::yield_now().await;
                return Err(io::Error::new(io::ErrorKind::NotConnected, "socket shut down"));
            };
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                result = async {
                    let n = writer.write(buf).await?;
                    writer.flush().await?;
                    Ok::<_, io::Error>(n)
                } => Some(result),
            }
        };
        match outcome {
            Some(result) => result,
            None => {
                guard.take();
                Err(aborted())
            }
        }
    }

    /// Release the stack. In-flight operations are aborted.
    pub fn close(&self) {
        self.shutdown.cancel();
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl std::fmt::Debug for LayeredSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredSocket")
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "operation aborted")
}
