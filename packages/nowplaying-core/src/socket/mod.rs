//! Subscriber-facing WebSocket layer.
//!
//! - [`message`]: wire envelope, opcodes and close codes
//! - [`transport`]: frame sink/stream abstraction and the axum adapter
//! - [`connection`]: per-subscriber read/write tasks and retrying send
//! - [`pool`]: registry of authenticated connections
//! - [`session`]: handshake and heartbeat rules
//! - [`hub`]: state slot, watcher tasks and broadcast fan-out

pub mod connection;
pub mod hub;
pub mod message;
pub mod pool;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{Connection, ConnectionId, SendStats};
pub use hub::Hub;
pub use message::{ClientMessage, CloseCode, DispatchEvent, Envelope, Message, OpCode, Payload};
pub use pool::Pool;
pub use session::{ProtocolError, SessionState};
pub use transport::{split_websocket, Frame, FrameSink, FrameStream, TransportError};
