//! Streaming bridge between the producer and edge processes.
//!
//! The producer exposes two HTTP routes over its single [`Poller`]:
//! a point query for the current snapshot and a long-lived NDJSON stream of
//! change events. Edge processes consume them through [`BridgeClient`] and
//! relay the events into their local [`Hub`](crate::socket::Hub).
//!
//! [`Poller`]: crate::poller::Poller

mod client;
mod event;
mod relay;
mod server;

use thiserror::Error;

pub use client::{decode_lines, BridgeClient, EventStream};
pub use event::{BridgeEvent, EventKind};
pub use relay::{apply_event, forward_events, run_relay};
pub use server::{event_stream, router, BridgeQuery};

/// Errors raised on the edge side of the bridge.
///
/// Any of these ends the current event stream; the relay reconnects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The HTTP request to the producer failed or the stream broke.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The producer answered with a non-success status.
    #[error("producer returned status {0}")]
    Status(u16),

    /// A line or body could not be decoded.
    #[error("failed to decode bridge payload: {0}")]
    Decode(String),

    /// A CHANGE event arrived without a track.
    #[error("change event without track")]
    MissingTrack,

    /// A STATUS event arrived without a playing flag.
    #[error("status event without playing flag")]
    MissingStatus,

    /// A PROGRESS event arrived without a progress value.
    #[error("progress event without progress")]
    MissingProgress,
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}
