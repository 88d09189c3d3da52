//! Subscriber wire protocol: opcodes, close codes, and message envelopes.
//!
//! Every frame is a JSON object `{"op": <int>, "t"?: <event>, "d"?: <payload>}`.
//! Close codes never appear in the JSON body; they travel in the transport's
//! close frame.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use super::session::ProtocolError;

/// Integer tag identifying the purpose of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Server-pushed event, see [`DispatchEvent`].
    Dispatch = 0,
    /// Sent by the server right after a connection is accepted.
    Hello = 1,
    /// Sent by the client to start receiving events.
    Initialize = 2,
    /// Keepalive, sent by clients and used as a server ping.
    Heartbeat = 3,
    /// Server reply to a client heartbeat.
    HeartbeatAck = 4,
    /// Server-side error notification.
    Error = 5,
}

impl OpCode {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<i64> for OpCode {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, i64> {
        match value {
            0 => Ok(Self::Dispatch),
            1 => Ok(Self::Hello),
            2 => Ok(Self::Initialize),
            3 => Ok(Self::Heartbeat),
            4 => Ok(Self::HeartbeatAck),
            5 => Ok(Self::Error),
            other => Err(other),
        }
    }
}

impl Serialize for OpCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// Reason a connection was closed, carried in the transport close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000: orderly shutdown.
    Normal,
    /// 1006: transport vanished without a close frame.
    Abnormal,
    /// 1011: the server failed to write to the transport.
    InternalError,
    /// 4001: opcode unknown or not accepted from clients.
    InvalidOpcode,
    /// 4002: frame is not a valid message.
    InvalidMessage,
    /// 4003: heartbeat sent before INITIALIZE.
    NotAuthenticated,
    /// 4004: heartbeat ping went unanswered.
    ServerRequestedClose,
    /// 4005: INITIALIZE sent twice, or duplicate session id.
    AlreadyAuthenticated,
}

impl CloseCode {
    /// Numeric close code as sent on the wire.
    pub const fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::Abnormal => 1006,
            Self::InternalError => 1011,
            Self::InvalidOpcode => 4001,
            Self::InvalidMessage => 4002,
            Self::NotAuthenticated => 4003,
            Self::ServerRequestedClose => 4004,
            Self::AlreadyAuthenticated => 4005,
        }
    }

    /// Whether the code may appear in a close frame. 1006 only reports a
    /// transport that vanished and is never sent.
    pub const fn is_sendable(self) -> bool {
        !matches!(self, Self::Abnormal)
    }

    /// Human-readable reason sent alongside the code.
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Normal => "",
            Self::Abnormal => "",
            Self::InternalError => "Internal server error",
            Self::InvalidOpcode => "Invalid opcode",
            Self::InvalidMessage => "Invalid message",
            Self::NotAuthenticated => "Not authenticated",
            Self::ServerRequestedClose => "Disconnect by server request",
            Self::AlreadyAuthenticated => "Already authenticated",
        }
    }
}

/// Event name of a DISPATCH message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchEvent {
    /// Reply to INITIALIZE with the current state.
    InitialState,
    /// The track identity changed.
    TrackChange,
    /// Playback progress of the current track, in milliseconds.
    TrackProgress,
    /// The playing flag changed without a track change.
    UpdateStatus,
}

/// Typed `d` payload of a message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload<T> {
    /// Full state snapshot.
    State(Arc<T>),
    /// Progress in milliseconds.
    Progress(u64),
    /// Playing flag only.
    Status { is_playing: bool },
    /// HELLO parameters.
    Hello { heartbeat_interval: u64 },
}

/// Outbound protocol message.
#[derive(Debug, Clone, Serialize)]
pub struct Message<T> {
    pub op: OpCode,
    #[serde(rename = "t", skip_serializing_if = "Option::is_none")]
    pub event: Option<DispatchEvent>,
    #[serde(rename = "d", skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload<T>>,
}

impl<T: Serialize> Message<T> {
    fn bare(op: OpCode) -> Self {
        Self {
            op,
            event: None,
            data: None,
        }
    }

    /// Builds a DISPATCH message.
    pub fn dispatch(event: DispatchEvent, data: Option<Payload<T>>) -> Self {
        Self {
            op: OpCode::Dispatch,
            event: Some(event),
            data,
        }
    }

    /// Builds the HELLO message advertising the heartbeat window.
    pub fn hello(heartbeat: Duration) -> Self {
        Self {
            data: Some(Payload::Hello {
                heartbeat_interval: heartbeat.as_millis() as u64,
            }),
            ..Self::bare(OpCode::Hello)
        }
    }

    pub fn heartbeat() -> Self {
        Self::bare(OpCode::Heartbeat)
    }

    pub fn heartbeat_ack() -> Self {
        Self::bare(OpCode::HeartbeatAck)
    }

    /// Serializes the message into a frame ready for delivery.
    pub fn encode(&self) -> Result<Envelope, serde_json::Error> {
        serde_json::to_string(self).map(Envelope::new)
    }
}

/// An encoded message plus its transient delivery retry counter.
///
/// Broadcasts encode once and clone the envelope per connection, which only
/// bumps a reference count. The retry counter is never serialized.
#[derive(Debug, Clone)]
pub struct Envelope {
    text: Arc<str>,
    retries: u8,
}

impl Envelope {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self {
            text: text.into(),
            retries: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of times delivery has been deferred so far.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    pub(crate) fn retried(mut self) -> Self {
        self.retries = self.retries.saturating_add(1);
        self
    }
}

/// Inbound message from a subscriber.
///
/// Only the opcode matters; any `t`/`d` fields a client sends are ignored.
/// The opcode is kept raw so that unknown values can be told apart from
/// malformed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClientMessage {
    pub op: i64,
}

impl ClientMessage {
    /// Decodes a text or binary frame body.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(raw).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }
}
