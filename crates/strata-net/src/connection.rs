//! Raw connections
//!
//! A [`Connection`] is the byte stream handed to the upgrader once every
//! layer handshake has finished. It can be driven with `async` calls or with
//! callbacks that run on the connection's executor. Either way, operations in
//! one direction complete in the order they were issued.
//!
//! The first failure closes the connection. Its reason is kept and later
//! operations fail with that same reason. Callbacks never run once the owner
//! has closed or dropped the connection.

use crate::error::ConnectionError;
use crate::lifeline::{Lifeline, Observer};
use crate::socket::LayeredSocket;
use multiaddr::Multiaddr;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Issue-order sequencing for one direction
#[derive(Default)]
struct OpQueue {
    tail: Mutex<Option<oneshot::Receiver<()>>>,
}

/// A place in an [`OpQueue`]
struct Turn {
    previous: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

impl OpQueue {
    fn enqueue(&self) -> Turn {
        let (done, next) = oneshot::channel();
        let previous = self.tail.lock().replace(next);
        Turn { previous, done }
    }
}

impl Turn {
    /// Wait for every earlier operation. The returned sender releases the
    /// next one when dropped.
    async fn wait(self) -> oneshot::Sender<()> {
        if let Some(previous) = self.previous {
            let _ = previous.await;
        }
        self.done
    }
}

struct Shared {
    socket: LayeredSocket,
    initiator: bool,
    local: Multiaddr,
    remote: Multiaddr,
    close_reason: Mutex<Option<ConnectionError>>,
    reads: OpQueue,
    writes: OpQueue,
    label: String,
}

impl Shared {
    /// Record `err` as the close reason unless one exists, release the
    /// socket, and return the reason now in effect.
    fn fail(&self, err: ConnectionError) -> ConnectionError {
        let reason = {
            let mut reason = self.close_reason.lock();
            match &*reason {
                Some(existing) => existing.clone(),
                None => {
                    debug!("Connection {} closed: {}", self.label, err);
                    *reason = Some(err.clone());
                    err
                }
            }
        };
        self.socket.close();
        reason
    }

    /// Fail with the recorded reason once the connection is closed
    fn ensure_open(&self) -> Result<(), ConnectionError> {
        match &*self.close_reason.lock() {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    async fn read_some(&self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        match self.socket.read_some(buf).await {
            Ok(0) => Err(self.fail(ConnectionError::Eof)),
            Ok(n) => {
                trace!("Connection {} read {} bytes", self.label, n);
                Ok(n)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        self.ensure_open()?;
        let mut filled = 0;
        while filled < buf.len() {
            filled += self.read_some(&mut buf[filled..]).await?;
        }
        Ok(filled)
    }

    async fn write_some(&self, buf: &[u8]) -> Result<usize, ConnectionError> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        match self.socket.write_some(buf).await {
            Ok(0) => Err(self.fail(io::Error::from(io::ErrorKind::WriteZero).into())),
            Ok(n) => {
                trace!("Connection {} wrote {} bytes", self.label, n);
                Ok(n)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, ConnectionError> {
        self.ensure_open()?;
        let mut written = 0;
        while written < buf.len() {
            written += self.write_some(&buf[written..]).await?;
        }
        Ok(written)
    }
}

/// A connection over a finished layer stack
pub struct Connection {
    shared: Arc<Shared>,
    lifeline: Lifeline,
}

impl Connection {
    /// Wrap an established socket
    pub fn new(socket: LayeredSocket, initiator: bool, local: Multiaddr, remote: Multiaddr) -> Self {
        let label = if initiator {
            format!("{} -> {}", local, remote)
        } else {
            format!("{} <- {}", local, remote)
        };
        debug!("Connection {} open over {}", label, socket.kind());
        Self {
            shared: Arc::new(Shared {
                socket,
                initiator,
                local,
                remote,
                close_reason: Mutex::new(None),
                reads: OpQueue::default(),
                writes: OpQueue::default(),
                label,
            }),
            lifeline: Lifeline::new(),
        }
    }

    /// Fill `buf` completely
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let _turn = self.shared.reads.enqueue().wait().await;
        self.shared.read(buf).await
    }

    /// Read whatever is available, at least one byte
    pub async fn read_some(&self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let _turn = self.shared.reads.enqueue().wait().await;
        self.shared.read_some(buf).await
    }

    /// Write all of `buf`
    pub async fn write(&self, buf: &[u8]) -> Result<usize, ConnectionError> {
        let _turn = self.shared.writes.enqueue().wait().await;
        self.shared.write(buf).await
    }

    /// Write part of `buf`
    pub async fn write_some(&self, buf: &[u8]) -> Result<usize, ConnectionError> {
        let _turn = self.shared.writes.enqueue().wait().await;
        self.shared.write_some(buf).await
    }

    /// Read exactly `len` bytes and hand them to `on_complete`.
    pub fn read_with<F>(&self, len: usize, on_complete: F)
    where
        F: FnOnce(Result<Vec<u8>, ConnectionError>) + Send + 'static,
    {
        self.spawn_read(len, true, on_complete);
    }

    /// Read up to `max_len` bytes and hand them to `on_complete`.
    pub fn read_some_with<F>(&self, max_len: usize, on_complete: F)
    where
        F: FnOnce(Result<Vec<u8>, ConnectionError>) + Send + 'static,
    {
        self.spawn_read(max_len, false, on_complete);
    }

    /// Write all of `data`, then report the byte count to `on_complete`.
    pub fn write_with<F>(&self, data: Vec<u8>, on_complete: F)
    where
        F: FnOnce(Result<usize, ConnectionError>) + Send + 'static,
    {
        self.spawn_write(data, true, on_complete);
    }

    /// Write part of `data`, then report the byte count to `on_complete`.
    pub fn write_some_with<F>(&self, data: Vec<u8>, on_complete: F)
    where
        F: FnOnce(Result<usize, ConnectionError>) + Send + 'static,
    {
        self.spawn_write(data, false, on_complete);
    }

    fn spawn_read<F>(&self, len: usize, exact: bool, on_complete: F)
    where
        F: FnOnce(Result<Vec<u8>, ConnectionError>) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let observer = self.lifeline.observe();
        let turn = shared.reads.enqueue();
        self.shared.socket.executor().spawn(async move {
            let _done = turn.wait().await;
            if !observer.is_live() {
                return;
            }
            let mut buf = vec![0u8; len];
            let result = if exact {
                shared.read(&mut buf).await
            } else {
                shared.read_some(&mut buf).await
            };
            let result = result.map(|n| {
                buf.truncate(n);
                buf
            });
            observer.deliver(|| on_complete(result));
        });
    }

    fn spawn_write<F>(&self, data: Vec<u8>, all: bool, on_complete: F)
    where
        F: FnOnce(Result<usize, ConnectionError>) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let observer = self.lifeline.observe();
        let turn = shared.writes.enqueue();
        self.shared.socket.executor().spawn(async move {
            let _done = turn.wait().await;
            if !observer.is_live() {
                return;
            }
            let result = if all {
                shared.write(&data).await
            } else {
                shared.write_some(&data).await
            };
            observer.deliver(|| on_complete(result));
        });
    }

    /// Deliver a ready read result on a later executor turn.
    pub fn defer_read_callback<F>(&self, result: Result<Vec<u8>, ConnectionError>, on_complete: F)
    where
        F: FnOnce(Result<Vec<u8>, ConnectionError>) + Send + 'static,
    {
        self.defer(move || on_complete(result));
    }

    /// Deliver a ready write result on a later executor turn.
    pub fn defer_write_callback<F>(&self, result: Result<usize, ConnectionError>, on_complete: F)
    where
        F: FnOnce(Result<usize, ConnectionError>) + Send + 'static,
    {
        self.defer(move || on_complete(result));
    }

    fn defer(&self, f: impl FnOnce() + Send + 'static) {
        let observer: Observer = self.lifeline.observe();
        self.shared.socket.executor().spawn(async move {
            observer.deliver(f);
        });
    }

    /// Close the connection. Pending callbacks are dropped undelivered.
    pub fn close(&self) {
        self.lifeline.retire();
        self.shared.fail(ConnectionError::AbortedByLocal);
    }

    /// Whether the owner closed the connection or it failed
    pub fn is_closed(&self) -> bool {
        self.lifeline.is_retired() || self.shared.close_reason.lock().is_some()
    }

    /// Why the connection closed, if it has
    pub fn close_reason(&self) -> Option<ConnectionError> {
        self.shared.close_reason.lock().clone()
    }

    /// Whether this side dialed
    pub fn is_initiator(&self) -> bool {
        self.shared.initiator
    }

    pub fn local_address(&self) -> &Multiaddr {
        &self.shared.local
    }

    pub fn remote_address(&self) -> &Multiaddr {
        &self.shared.remote
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.fail(ConnectionError::AbortedByLocal);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("label", &self.shared.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}
