//! Transport abstraction between connections and the WebSocket library.
//!
//! A [`Connection`](super::Connection) only sees a boxed sink of outgoing
//! [`Frame`]s and a boxed stream of incoming ones. The axum adapter lives here
//! so the rest of the socket module stays transport-agnostic (and testable
//! with in-memory channels).

use std::pin::Pin;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use bytes::Bytes;
use futures::sink::{Sink, SinkExt};
use futures::stream::{Stream, StreamExt};
use thiserror::Error;

/// Transport-level failure. Fatal to the one affected connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),
}

/// A WebSocket frame, independent of the server library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    /// Close frame with optional `(code, reason)`.
    Close(Option<(u16, String)>),
}

/// Write half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Read half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

impl From<WsMessage> for Frame {
    fn from(msg: WsMessage) -> Self {
        match msg {
            WsMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            WsMessage::Binary(data) => Frame::Binary(data),
            WsMessage::Ping(data) => Frame::Ping(data),
            WsMessage::Pong(data) => Frame::Pong(data),
            WsMessage::Close(frame) => {
                Frame::Close(frame.map(|f| (f.code, f.reason.as_str().to_owned())))
            }
        }
    }
}

impl From<Frame> for WsMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(data) => WsMessage::Binary(data),
            Frame::Ping(data) => WsMessage::Ping(data),
            Frame::Pong(data) => WsMessage::Pong(data),
            Frame::Close(close) => WsMessage::Close(close.map(|(code, reason)| CloseFrame {
                code,
                reason: reason.into(),
            })),
        }
    }
}

/// Splits an upgraded axum WebSocket into transport halves.
pub fn split_websocket(socket: WebSocket) -> (FrameSink, FrameStream) {
    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(|e| TransportError::Write(e.to_string()))
        .with(|frame: Frame| futures::future::ready(Ok::<_, TransportError>(WsMessage::from(frame))));

    let stream = stream.map(|result| {
        result
            .map(Frame::from)
            .map_err(|e| TransportError::Read(e.to_string()))
    });

    (Box::pin(sink), Box::pin(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frames_keep_code_and_reason() {
        let msg = WsMessage::from(Frame::Close(Some((4004, "bye".into()))));
        match Frame::from(msg) {
            Frame::Close(Some((code, reason))) => {
                assert_eq!(code, 4004);
                assert_eq!(reason, "bye");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn text_frames_survive_conversion() {
        let msg = WsMessage::from(Frame::Text(r#"{"op":2}"#.into()));
        assert_eq!(Frame::from(msg), Frame::Text(r#"{"op":2}"#.into()));
    }
}
