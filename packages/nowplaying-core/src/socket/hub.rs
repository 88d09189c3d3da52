//! The per-process subscriber hub.
//!
//! Owns the latest known state and the registry of authenticated
//! connections, runs one watcher task per connection for the handshake and
//! heartbeat rules, and fans broadcasts out to the registry.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::{sleep, Instant};

use super::connection::{Connection, Inbound};
use super::message::{CloseCode, DispatchEvent, Message, Payload};
use super::pool::Pool;
use super::session::{self, Expiry, SessionState, Transition, Watchdog};
use super::transport::{FrameSink, FrameStream};

/// Subscriber hub, generic over the state it distributes.
pub struct Hub<T> {
    state: RwLock<Option<Arc<T>>>,
    pool: Pool,
    heartbeat_timeout: Duration,
}

impl<T> Hub<T>
where
    T: Serialize + Send + Sync + 'static,
{
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(None),
            pool: Pool::new(),
            heartbeat_timeout,
        }
    }

    /// Replaces the held state and returns the shared handle to it.
    pub fn set_state(&self, state: T) -> Arc<T> {
        let state = Arc::new(state);
        self.set_shared(Arc::clone(&state));
        state
    }

    pub fn set_shared(&self, state: Arc<T>) {
        *self.state.write() = Some(state);
    }

    /// Latest known state, used to seed newly authenticated connections.
    pub fn state(&self) -> Option<Arc<T>> {
        self.state.read().clone()
    }

    pub fn has_state(&self) -> bool {
        self.state.read().is_some()
    }

    /// Number of authenticated connections.
    pub fn listeners(&self) -> usize {
        self.pool.len()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Accepts a transport and serves it until the connection terminates.
    pub async fn handle(self: &Arc<Self>, sink: FrameSink, stream: FrameStream) {
        let conn = Connection::new(sink, stream);
        self.serve(conn).await;
    }

    /// Starts, registers and serves an already built connection.
    pub async fn serve(self: &Arc<Self>, conn: Arc<Connection>) {
        let Some(inbound) = conn.start() else {
            return;
        };
        self.register(&conn, inbound);
        conn.closed().await;
        self.pool.remove_connection(&conn);
    }

    /// Greets a started connection and spawns its watcher.
    ///
    /// A connection whose id is already registered is closed with
    /// [`CloseCode::AlreadyAuthenticated`]; the registered one is kept.
    pub fn register(self: &Arc<Self>, conn: &Arc<Connection>, inbound: Inbound) -> bool {
        if self.pool.contains(conn.id()) {
            log::warn!("[Hub] Duplicate connection id {}", conn.id());
            conn.close(CloseCode::AlreadyAuthenticated);
            return false;
        }

        self.send(conn, &Message::hello(self.heartbeat_timeout));
        tokio::spawn(Arc::clone(self).watch(Arc::clone(conn), inbound));
        log::debug!("[Hub] Connection {} accepted", conn.id());
        true
    }

    /// Removes a connection from the registry. Idempotent.
    pub fn unregister(&self, id: &str) -> Option<Arc<Connection>> {
        self.pool.remove(id)
    }

    /// Delivers a message to every authenticated connection.
    ///
    /// The message is encoded once. Each connection only queues the frame,
    /// so a slow subscriber never holds up the others. Returns the number of
    /// connections the message was handed to.
    pub fn broadcast(&self, message: &Message<T>) -> usize {
        let envelope = match message.encode() {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("[Hub] Failed to encode broadcast: {}", e);
                return 0;
            }
        };

        let connections = self.pool.connections();
        for conn in &connections {
            conn.send(envelope.clone());
        }
        connections.len()
    }

    /// Stores a new state and broadcasts it as `TRACK_CHANGE`.
    pub fn publish_change(&self, state: Arc<T>) -> usize {
        self.set_shared(Arc::clone(&state));
        self.broadcast(&Message::dispatch(
            DispatchEvent::TrackChange,
            Some(Payload::State(state)),
        ))
    }

    /// Broadcasts a `TRACK_PROGRESS` event.
    pub fn publish_progress(&self, progress: u64) -> usize {
        self.broadcast(&Message::dispatch(
            DispatchEvent::TrackProgress,
            Some(Payload::Progress(progress)),
        ))
    }

    /// Broadcasts an `UPDATE_STATUS` event.
    pub fn publish_status(&self, is_playing: bool) -> usize {
        self.broadcast(&Message::dispatch(
            DispatchEvent::UpdateStatus,
            Some(Payload::Status { is_playing }),
        ))
    }

    /// Closes every registered connection normally and empties the registry.
    pub fn close(&self) {
        let connections = self.pool.drain();
        log::info!("[Hub] Closing {} connection(s)", connections.len());
        for conn in connections {
            conn.close(CloseCode::Normal);
        }
    }

    fn send(&self, conn: &Arc<Connection>, message: &Message<T>) {
        match message.encode() {
            Ok(envelope) => conn.send(envelope),
            Err(e) => log::error!("[Hub] Failed to encode message for {}: {}", conn.id(), e),
        }
    }

    fn authenticate(&self, conn: &Arc<Connection>) -> bool {
        if self.pool.contains(conn.id()) {
            conn.close(CloseCode::AlreadyAuthenticated);
            return false;
        }

        let seeded = self.state();
        let initial = Message::dispatch(
            DispatchEvent::InitialState,
            seeded.clone().map(Payload::State),
        );
        self.send(conn, &initial);

        if !self.pool.insert(Arc::clone(conn)) {
            conn.close(CloseCode::AlreadyAuthenticated);
            return false;
        }
        self.catch_up(conn, seeded.as_ref());
        log::debug!("[Hub] Connection {} authenticated", conn.id());
        true
    }

    /// Sends the current state as `TRACK_CHANGE` if it moved on since
    /// `seeded` was read, which happens when a change is published between
    /// INITIAL_STATE and the registry insert.
    fn catch_up(&self, conn: &Arc<Connection>, seeded: Option<&Arc<T>>) {
        let Some(current) = self.state() else {
            return;
        };
        if seeded.is_some_and(|seeded| Arc::ptr_eq(seeded, &current)) {
            return;
        }
        self.send(
            conn,
            &Message::dispatch(DispatchEvent::TrackChange, Some(Payload::State(current))),
        );
    }

    async fn watch(self: Arc<Self>, conn: Arc<Connection>, mut inbound: Inbound) {
        let mut state = SessionState::Pending;
        let mut watchdog = Watchdog::default();
        let timer = sleep(self.heartbeat_timeout);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = conn.closed() => break,

                message = inbound.recv() => {
                    let Some(message) = message else { break };

                    match session::transition(state, message.op) {
                        Ok(Transition::Authenticate) => {
                            if !self.authenticate(&conn) {
                                break;
                            }
                            state = SessionState::Authenticated;
                            timer.as_mut().reset(Instant::now() + self.heartbeat_timeout);
                        }
                        Ok(Transition::Acknowledge) => {
                            watchdog.reset();
                            timer.as_mut().reset(Instant::now() + self.heartbeat_timeout);
                            self.send(&conn, &Message::heartbeat_ack());
                        }
                        Err(e) => {
                            log::warn!("[Hub] Closing {}: {}", conn.id(), e);
                            conn.close(e.close_code());
                            break;
                        }
                    }
                }

                _ = &mut timer => match watchdog.expire(state) {
                    Expiry::Ping => {
                        self.send(&conn, &Message::heartbeat());
                        timer.as_mut().reset(Instant::now() + self.heartbeat_timeout);
                    }
                    Expiry::Zombie => {
                        log::info!("[Hub] Connection {} timed out", conn.id());
                        conn.close(CloseCode::ServerRequestedClose);
                        break;
                    }
                },
            }
        }

        self.pool.remove_connection(&conn);
    }
}
