//! One subscriber connection: read task, write task, liveness, and close.
//!
//! Writes are owned by a single writer task fed through a queue, so frames
//! from concurrent senders never interleave and per-connection order is
//! preserved. Reads happen in a dedicated task that turns frames into
//! [`ClientMessage`]s for the hub.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::sink::SinkExt;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::message::{ClientMessage, CloseCode, Envelope};
use super::transport::{Frame, FrameSink, FrameStream};
use crate::protocol_constants::{
    CLOSE_HANDSHAKE_TIMEOUT_SECS, INBOUND_QUEUE_CAPACITY, MAX_SEND_RETRIES, SEND_RETRY_DELAY_MS,
};

/// Unique per-process connection identifier.
pub type ConnectionId = String;

/// Inbound messages decoded by the read task.
pub type Inbound = mpsc::Receiver<ClientMessage>;

enum Outbound {
    Frame(Envelope),
    Close(CloseCode),
}

struct Link {
    alive: bool,
    closed: Option<CloseCode>,
}

/// Counters for the deferred-send path.
#[derive(Debug, Default)]
struct SendCounters {
    attempts: AtomicU64,
    deferred: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of a connection's send counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendStats {
    /// Calls to [`Connection::send`], including retries.
    pub attempts: u64,
    /// Sends rescheduled because the connection was not alive.
    pub deferred: u64,
    /// Messages given up on.
    pub dropped: u64,
}

/// A live subscriber connection.
///
/// Created not alive; [`start`](Self::start) spawns the I/O tasks and marks
/// it alive. It goes back to not alive exactly once, on close, and is never
/// reused.
pub struct Connection {
    id: ConnectionId,
    link: Mutex<Link>,
    outbound: mpsc::UnboundedSender<Outbound>,
    io: Mutex<Option<(FrameSink, FrameStream, mpsc::UnboundedReceiver<Outbound>)>>,
    done: CancellationToken,
    retry_delay: Duration,
    counters: SendCounters,
}

impl Connection {
    /// Wraps a transport under a freshly generated id.
    pub fn new(sink: FrameSink, stream: FrameStream) -> Arc<Self> {
        Self::with_id(uuid::Uuid::new_v4().to_string(), sink, stream)
    }

    /// Wraps a transport under a caller-chosen id.
    pub fn with_id(id: impl Into<ConnectionId>, sink: FrameSink, stream: FrameStream) -> Arc<Self> {
        let (outbound, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: id.into(),
            link: Mutex::new(Link {
                alive: false,
                closed: None,
            }),
            outbound,
            io: Mutex::new(Some((sink, stream, rx))),
            done: CancellationToken::new(),
            retry_delay: Duration::from_millis(SEND_RETRY_DELAY_MS),
            counters: SendCounters::default(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_alive(&self) -> bool {
        self.link.lock().alive
    }

    /// Close code, once the connection has been closed.
    pub fn close_code(&self) -> Option<CloseCode> {
        self.link.lock().closed
    }

    /// Resolves once the connection has been closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.done.cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    pub fn send_stats(&self) -> SendStats {
        SendStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            deferred: self.counters.deferred.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Spawns the read and write tasks and marks the connection alive.
    ///
    /// Returns the inbound message queue, or `None` if the connection was
    /// already started or closed.
    pub fn start(self: &Arc<Self>) -> Option<Inbound> {
        let (sink, stream, rx) = self.io.lock().take()?;
        {
            let mut link = self.link.lock();
            if link.closed.is_some() {
                return None;
            }
            link.alive = true;
        }

        let (tx, inbound) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        tokio::spawn(Arc::clone(self).write_loop(sink, rx));
        tokio::spawn(Arc::clone(self).read_loop(stream, tx));
        Some(inbound)
    }

    /// Queues an encoded message for delivery.
    ///
    /// If the connection is not alive yet, delivery is retried after a short
    /// delay, up to [`MAX_SEND_RETRIES`] times, then silently dropped. Closed
    /// connections drop immediately. No error ever reaches the caller.
    pub fn send(self: &Arc<Self>, envelope: Envelope) {
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);

        if !self.is_alive() {
            self.defer(envelope);
            return;
        }

        if self.outbound.send(Outbound::Frame(envelope)).is_err() {
            log::trace!("[WS] Writer for {} already gone, dropping message", self.id);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn defer(self: &Arc<Self>, envelope: Envelope) {
        if self.is_closed() || envelope.retries() >= MAX_SEND_RETRIES {
            log::trace!(
                "[WS] Dropping message for {} after {} retries",
                self.id,
                envelope.retries()
            );
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.counters.deferred.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = conn.done.cancelled() => {
                    conn.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
                _ = tokio::time::sleep(conn.retry_delay) => {
                    conn.send(envelope.retried());
                }
            }
        });
    }

    /// Closes the connection with the given code.
    ///
    /// Idempotent: only the first call fires the termination signal and
    /// queues a close frame (none for [`CloseCode::Abnormal`]). Returns
    /// whether this call closed it.
    pub fn close(&self, code: CloseCode) -> bool {
        {
            let mut link = self.link.lock();
            if link.closed.is_some() {
                return false;
            }
            link.alive = false;
            link.closed = Some(code);
        }

        // Queued before cancelling so the writer drains it ahead of shutdown.
        if code.is_sendable() {
            let _ = self.outbound.send(Outbound::Close(code));
        }
        self.done.cancel();

        log::debug!(
            "[WS] Connection {} closed: {} {}",
            self.id,
            code.code(),
            code.reason()
        );
        true
    }

    async fn write_loop(self: Arc<Self>, mut sink: FrameSink, mut rx: mpsc::UnboundedReceiver<Outbound>) {
        loop {
            let next = tokio::select! {
                biased;
                next = rx.recv() => next,
                _ = self.done.cancelled() => None,
            };

            match next {
                Some(Outbound::Frame(envelope)) => {
                    if let Err(e) = sink.send(Frame::Text(envelope.text().to_owned())).await {
                        log::warn!("[WS] Write to {} failed: {}", self.id, e);
                        self.close(CloseCode::InternalError);
                    }
                }
                Some(Outbound::Close(code)) => {
                    let frame = Frame::Close(Some((code.code(), code.reason().to_owned())));
                    let handshake = async {
                        sink.send(frame).await?;
                        sink.close().await
                    };
                    let deadline = Duration::from_secs(CLOSE_HANDSHAKE_TIMEOUT_SECS);
                    if let Ok(Err(e)) = tokio::time::timeout(deadline, handshake).await {
                        log::debug!("[WS] Close handshake with {} failed: {}", self.id, e);
                    }
                    break;
                }
                None => break,
            }
        }
    }

    async fn read_loop(self: Arc<Self>, mut stream: FrameStream, tx: mpsc::Sender<ClientMessage>) {
        loop {
            let frame = tokio::select! {
                _ = self.done.cancelled() => break,
                frame = stream.next() => frame,
            };

            let raw = match frame {
                Some(Ok(Frame::Text(text))) => text.into_bytes(),
                Some(Ok(Frame::Binary(data))) => data.to_vec(),
                Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => continue,
                Some(Ok(Frame::Close(_))) => {
                    self.close(CloseCode::Normal);
                    break;
                }
                Some(Err(e)) => {
                    log::debug!("[WS] Read from {} failed: {}", self.id, e);
                    self.close(CloseCode::Abnormal);
                    break;
                }
                None => {
                    self.close(CloseCode::Abnormal);
                    break;
                }
            };

            match ClientMessage::decode(&raw) {
                Ok(message) => {
                    let delivered = tokio::select! {
                        _ = self.done.cancelled() => false,
                        sent = tx.send(message) => sent.is_ok(),
                    };
                    if !delivered {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("[WS] {} sent {}", self.id, e);
                    self.close(e.close_code());
                    break;
                }
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.done.cancel();
    }
}
