//! Handshake and heartbeat state machine for a single subscriber.
//!
//! The rules are kept as pure functions so the hub's watcher task only
//! performs the side effects they dictate.

use thiserror::Error;

use super::message::{CloseCode, OpCode};

/// Where a connection stands in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Accepted, HELLO sent, not yet in the registry.
    #[default]
    Pending,
    /// INITIALIZE received; present in the registry and receiving broadcasts.
    Authenticated,
}

/// Action the hub must take for a valid inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Send INITIAL_STATE and add the connection to the registry.
    Authenticate,
    /// Send HEARTBEAT_ACK and restart the heartbeat window.
    Acknowledge,
}

/// Protocol violation by a subscriber. Closes that one connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid opcode {0}")]
    InvalidOpcode(i64),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("heartbeat before initialize")]
    NotAuthenticated,

    #[error("already authenticated")]
    AlreadyAuthenticated,

    #[error("heartbeat ping unanswered")]
    HeartbeatTimeout,
}

impl ProtocolError {
    /// Close code sent to the offending client.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::InvalidOpcode(_) => CloseCode::InvalidOpcode,
            Self::InvalidMessage(_) => CloseCode::InvalidMessage,
            Self::NotAuthenticated => CloseCode::NotAuthenticated,
            Self::AlreadyAuthenticated => CloseCode::AlreadyAuthenticated,
            Self::HeartbeatTimeout => CloseCode::ServerRequestedClose,
        }
    }
}

/// Applies an inbound opcode to the current state.
pub fn transition(state: SessionState, op: i64) -> Result<Transition, ProtocolError> {
    match (state, OpCode::try_from(op)) {
        (SessionState::Pending, Ok(OpCode::Initialize)) => Ok(Transition::Authenticate),
        (SessionState::Authenticated, Ok(OpCode::Initialize)) => {
            Err(ProtocolError::AlreadyAuthenticated)
        }
        (SessionState::Authenticated, Ok(OpCode::Heartbeat)) => Ok(Transition::Acknowledge),
        (SessionState::Pending, Ok(OpCode::Heartbeat)) => Err(ProtocolError::NotAuthenticated),
        (_, _) => Err(ProtocolError::InvalidOpcode(op)),
    }
}

/// What to do when the heartbeat timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Send a server HEARTBEAT and wait one more window.
    Ping,
    /// Close the connection with [`CloseCode::ServerRequestedClose`].
    Zombie,
}

/// Tracks whether a server ping is awaiting a client heartbeat.
#[derive(Debug, Default)]
pub struct Watchdog {
    ping_outstanding: bool,
}

impl Watchdog {
    /// Handles a timer expiry.
    ///
    /// Pending connections get no ping: a client that never initializes
    /// within one window is dropped.
    pub fn expire(&mut self, state: SessionState) -> Expiry {
        if state == SessionState::Pending || self.ping_outstanding {
            return Expiry::Zombie;
        }
        self.ping_outstanding = true;
        Expiry::Ping
    }

    /// Records a client heartbeat.
    pub fn reset(&mut self) {
        self.ping_outstanding = false;
    }

    pub fn ping_outstanding(&self) -> bool {
        self.ping_outstanding
    }
}
