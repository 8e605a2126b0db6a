//! Socket plumbing: connect, reader task, writer task.
//!
//! The writer task owns the write half and drains an unbounded channel, so
//! frames leave in the order they were queued. [`WireWriter`] is the
//! [`FrameSink`] the dispatcher writes to; the manager attaches it to each
//! new connection and detaches it on teardown.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ConnectionError;
use crate::collaborators::FrameSink;
use crate::protocol::{FrameDecoder, ProtocolMessage};
use crate::protocol_constants::READ_CHUNK_SIZE;

/// Opens the SlimProto socket. DNS resolution counts against `timeout`.
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ConnectionError::Timeout)??;
    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("[Connection] set_nodelay failed: {}", e);
    }
    Ok(stream)
}

/// Swappable outbound queue.
#[derive(Default)]
pub struct WireWriter {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

impl WireWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes subsequent frames to a new connection.
    pub fn attach(&self, tx: mpsc::UnboundedSender<Bytes>) {
        *self.tx.lock() = Some(tx);
    }

    /// Stops routing frames. The writer task drains what is queued and exits.
    pub fn detach(&self) {
        self.tx.lock().take();
    }

    #[cfg(test)]
    fn is_attached(&self) -> bool {
        self.tx.lock().is_some()
    }
}

impl FrameSink for WireWriter {
    fn send_frame(&self, frame: Bytes) {
        match self.tx.lock().as_ref() {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    log::debug!("[Connection] Writer task gone, frame dropped");
                }
            }
            None => log::trace!("[Connection] Not connected, frame dropped"),
        }
    }
}

/// Spawns the writer task for one connection.
pub fn spawn_writer(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write_half.write_all(&frame).await {
                log::warn!("[Connection] Write failed: {}", e);
                return;
            }
        }
        // Channel closed by detach: flush and half-close.
        let _ = write_half.shutdown().await;
    })
}

/// What the reader task reports back.
#[derive(Debug)]
pub enum ReadEvent {
    Frame(ProtocolMessage),
    /// Socket closed or failed; `None` means orderly EOF.
    Closed(Option<std::io::Error>),
}

/// Spawns the reader task for one connection.
///
/// `on_event` is called for every decoded frame and once when the socket
/// ends. Cancelling `cancel` stops the task without a `Closed` report.
pub fn spawn_reader<F, Fut>(
    mut read_half: OwnedReadHalf,
    cancel: CancellationToken,
    mut on_event: F,
) -> JoinHandle<()>
where
    F: FnMut(ReadEvent) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = bool> + Send + 'static,
{
    tokio::spawn(async move {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        loop {
            buf.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => return,
                read = read_half.read_buf(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    on_event(ReadEvent::Closed(None)).await;
                    return;
                }
                Ok(_) => decoder.extend(&buf),
                Err(e) => {
                    on_event(ReadEvent::Closed(Some(e))).await;
                    return;
                }
            }

            loop {
                match decoder.next_frame() {
                    Ok(Some(message)) => {
                        if !on_event(ReadEvent::Frame(message)).await {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("[Connection] Dropping buffered bytes: {}", e);
                        break;
                    }
                }
            }
        }
    })
}
