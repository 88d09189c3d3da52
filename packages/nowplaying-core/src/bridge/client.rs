//! Edge side of the bridge.

use std::fmt::Display;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use reqwest::Client;

use super::event::BridgeEvent;
use super::BridgeError;
use crate::track::Track;

/// Decoded bridge events, as returned by [`BridgeClient::listen`].
pub type EventStream = Pin<Box<dyn Stream<Item = Result<BridgeEvent, BridgeError>> + Send>>;

/// HTTP client for a producer's bridge routes.
#[derive(Clone)]
pub struct BridgeClient {
    http: Client,
    base_url: String,
    id: String,
}

impl BridgeClient {
    /// Creates a client with a fresh request id.
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self::with_id(http, base_url, uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(http: Client, base_url: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            id: id.into(),
        }
    }

    /// Request id sent to the producer.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}?id={}", self.base_url, path, self.id)
    }

    async fn request(&self, path: &str) -> Result<reqwest::Response, BridgeError> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Status(status.as_u16()));
        }
        Ok(response)
    }

    /// Fetches the producer's current snapshot.
    pub async fn get_track(&self) -> Result<Track, BridgeError> {
        let response = self.request("/bridge/track").await?;
        Ok(response.json().await?)
    }

    /// Opens the producer's event stream.
    pub async fn listen(&self) -> Result<EventStream, BridgeError> {
        let response = self.request("/bridge/listen").await?;
        Ok(Box::pin(decode_lines(response.bytes_stream())))
    }
}

fn decode_line(line: &[u8]) -> Option<Result<BridgeEvent, BridgeError>> {
    let start = line.iter().position(|b| !b.is_ascii_whitespace())?;
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace())?;
    let line = &line[start..=end];
    Some(serde_json::from_slice(line).map_err(|e| BridgeError::Decode(e.to_string())))
}

/// Splits a chunked body into NDJSON lines and decodes each one.
///
/// Chunk boundaries need not align with lines. A trailing line without a
/// newline is decoded when the body ends.
pub fn decode_lines<S, E>(chunks: S) -> impl Stream<Item = Result<BridgeEvent, BridgeError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::try_stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer = BytesMut::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| BridgeError::Http(e.to_string()))?;
            buffer.extend_from_slice(&chunk);

            while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                let line = buffer.split_to(end + 1);
                if let Some(event) = decode_line(&line) {
                    yield event?;
                }
            }
        }

        if !buffer.is_empty() {
            if let Some(event) = decode_line(&buffer) {
                yield event?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::EventKind;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
        let parts: Vec<Result<Bytes, String>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        futures::stream::iter(parts)
    }

    async fn collect(parts: &[&'static str]) -> Vec<Result<BridgeEvent, BridgeError>> {
        decode_lines(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let events = collect(&[
            "{\"id\":\"e\",\"kind\":\"PRO",
            "GRESS\",\"progress\":1}\n{\"id\":\"e\",",
            "\"kind\":\"PROGRESS\",\"progress\":2}\n",
        ])
        .await;

        let progress: Vec<_> = events.into_iter().map(|e| e.unwrap().progress).collect();
        assert_eq!(progress, vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn blank_lines_and_trailing_lines_are_handled() {
        let events = collect(&["\n\r\n{\"id\":\"e\",\"kind\":\"PROGRESS\",\"progress\":5}"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().kind, EventKind::Progress);
    }

    #[tokio::test]
    async fn garbage_ends_the_stream_with_an_error() {
        let events = collect(&[
            "not json\n",
            "{\"id\":\"e\",\"kind\":\"PROGRESS\",\"progress\":1}\n",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(BridgeError::Decode(_))));
    }

    #[tokio::test]
    async fn transport_errors_are_reported() {
        let stream = futures::stream::iter(vec![Err::<Bytes, _>("reset by peer".to_string())]);
        let events: Vec<_> = decode_lines(stream).collect().await;
        assert_eq!(events, vec![Err(BridgeError::Http("reset by peer".into()))]);
    }

    #[test]
    fn urls_carry_the_request_id() {
        let client = BridgeClient::with_id(Client::new(), "http://producer:3000/", "edge-1");
        assert_eq!(
            client.url("/bridge/listen"),
            "http://producer:3000/bridge/listen?id=edge-1"
        );
    }
}
