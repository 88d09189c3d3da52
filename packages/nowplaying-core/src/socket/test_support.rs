//! In-memory transports for socket tests.

use std::time::Duration;

use futures::channel::mpsc;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde_json::Value;

use super::message::Envelope;
use super::transport::{Frame, FrameSink, FrameStream, TransportError};

/// The peer end of an in-memory transport.
pub(crate) struct TestClient {
    written: mpsc::UnboundedReceiver<Frame>,
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
}

/// Creates a transport whose far end is driven by a [`TestClient`].
pub(crate) fn transport() -> (FrameSink, FrameStream, TestClient) {
    let (out_tx, out_rx) = mpsc::unbounded::<Frame>();
    let (in_tx, in_rx) = mpsc::unbounded::<Result<Frame, TransportError>>();

    let sink = out_tx.sink_map_err(|e| TransportError::Write(e.to_string()));
    let client = TestClient {
        written: out_rx,
        inbound: in_tx,
    };
    (Box::pin(sink), Box::pin(in_rx), client)
}

pub(crate) fn envelope(text: &str) -> Envelope {
    Envelope::new(text)
}

impl TestClient {
    pub(crate) fn send_frame(&self, frame: Frame) {
        let _ = self.inbound.unbounded_send(Ok(frame));
    }

    pub(crate) fn send_text(&self, text: &str) {
        self.send_frame(Frame::Text(text.to_owned()));
    }

    pub(crate) fn send_json(&self, value: Value) {
        self.send_text(&value.to_string());
    }

    /// Next frame written by the server, or `None` once the sink is gone.
    pub(crate) async fn recv_frame(&mut self) -> Option<Frame> {
        self.written.next().await
    }

    pub(crate) async fn recv_text(&mut self) -> String {
        match self.recv_frame().await {
            Some(Frame::Text(text)) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    pub(crate) async fn recv_json(&mut self) -> Value {
        serde_json::from_str(&self.recv_text().await).unwrap()
    }

    /// Skips data frames until the close frame and returns its code.
    pub(crate) async fn recv_close(&mut self) -> u16 {
        loop {
            match self.recv_frame().await {
                Some(Frame::Close(Some((code, _)))) => return code,
                Some(Frame::Close(None)) => panic!("close frame without code"),
                Some(_) => continue,
                None => panic!("transport ended without a close frame"),
            }
        }
    }

    /// Returns a frame only if one arrives within `wait`.
    pub(crate) async fn try_recv(&mut self, wait: Duration) -> Option<Frame> {
        tokio::time::timeout(wait, self.recv_frame()).await.ok().flatten()
    }

    /// Ends the server's inbound stream without a close frame, keeping the
    /// written side readable.
    pub(crate) fn hang_up(self) -> mpsc::UnboundedReceiver<Frame> {
        self.written
    }

    /// Drops the read side, keeping the server's inbound stream open.
    pub(crate) fn into_inbound(self) -> mpsc::UnboundedSender<Result<Frame, TransportError>> {
        self.inbound
    }
}

/// Yields to the scheduler until `cond` holds.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
