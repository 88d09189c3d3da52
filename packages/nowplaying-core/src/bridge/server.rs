//! Producer side of the bridge.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use super::event::BridgeEvent;
use crate::error::{NowPlayingError, NowPlayingResult};
use crate::poller::{Poller, TrackEvent};
use crate::protocol_constants::NDJSON_CONTENT_TYPE;
use crate::track::Track;

/// Query string shared by both bridge routes.
#[derive(Debug, Default, Deserialize)]
pub struct BridgeQuery {
    /// Caller-chosen request id, echoed in every streamed event.
    #[serde(default)]
    pub id: Option<String>,
}

impl BridgeQuery {
    fn request_id(self) -> String {
        self.id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone)]
struct BridgeState {
    poller: Arc<Poller>,
    shutdown: CancellationToken,
}

/// Bridge routes served by the producer.
///
/// Open event streams end when `shutdown` fires so the server can drain.
pub fn router(poller: Arc<Poller>, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/bridge/track", get(get_track))
        .route("/bridge/listen", get(listen))
        .with_state(BridgeState { poller, shutdown })
}

/// Point query. Blocks until the upstream answers or the server stops.
async fn get_track(
    State(state): State<BridgeState>,
    Query(query): Query<BridgeQuery>,
) -> NowPlayingResult<Json<Arc<Track>>> {
    let id = query.request_id();
    log::debug!("[Bridge] Track requested by {}", id);
    state
        .poller
        .fetch_until_success(&state.shutdown)
        .await
        .map(Json)
        .ok_or(NowPlayingError::ShuttingDown)
}

/// Attaches the caller to the poller's event feed.
async fn listen(State(state): State<BridgeState>, Query(query): Query<BridgeQuery>) -> Response {
    let id = query.request_id();
    log::info!("[Bridge] Edge {} attached", id);

    let events = event_stream(id, state.poller.subscribe())
        .take_until(state.shutdown.cancelled_owned());
    let body = Body::from_stream(events);
    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

/// Turns a poller subscription into NDJSON lines.
///
/// A lagging receiver skips the events it missed. The stream only ends when
/// the poller's sender is dropped.
pub fn event_stream(
    id: String,
    rx: broadcast::Receiver<TrackEvent>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    BroadcastStream::new(rx).filter_map(move |result| {
        let line = match result {
            Ok(event) => match BridgeEvent::from_track_event(&id, &event).to_line() {
                Ok(line) => Some(Ok(line)),
                Err(e) => {
                    log::error!("[Bridge] Failed to encode event for {}: {}", id, e);
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                log::warn!("[Bridge] Edge {} lagged, skipped {} event(s)", id, n);
                None
            }
        };
        futures::future::ready(line)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::poller::testing::{failure, ScriptedSource};
    use crate::track::fixtures::playing;

    #[tokio::test]
    async fn stream_emits_one_line_per_event() {
        let (tx, rx) = broadcast::channel(8);
        let mut stream = Box::pin(event_stream("edge".into(), rx));

        tx.send(TrackEvent::Progress(6000)).unwrap();
        tx.send(TrackEvent::Change(Arc::new(playing("b", 100)))).unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"{\"id\":\"edge\",\"kind\":\"PROGRESS\",\"progress\":6000}\n");

        let second = stream.next().await.unwrap().unwrap();
        let event: BridgeEvent = serde_json::from_slice(&second).unwrap();
        assert_eq!(event.track.unwrap().id, "b");
    }

    #[tokio::test]
    async fn lagging_streams_skip_missed_events() {
        let (tx, rx) = broadcast::channel(1);
        let mut stream = Box::pin(event_stream("edge".into(), rx));

        for progress in [1, 2, 3] {
            tx.send(TrackEvent::Progress(progress)).unwrap();
        }

        let line = stream.next().await.unwrap().unwrap();
        let event: BridgeEvent = serde_json::from_slice(&line).unwrap();
        assert_eq!(event.progress, Some(3));
    }

    #[tokio::test]
    async fn stream_ends_with_the_poller() {
        let (tx, rx) = broadcast::channel::<TrackEvent>(1);
        let mut stream = Box::pin(event_stream("edge".into(), rx));
        drop(tx);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn track_query_waits_out_upstream_failures() {
        let source = ScriptedSource::new([failure(), Ok(playing("a", 10))]);
        let state = BridgeState {
            poller: Arc::new(Poller::new(source, &Config::default())),
            shutdown: CancellationToken::new(),
        };

        let Json(track) = get_track(State(state), Query(BridgeQuery::default()))
            .await
            .unwrap();
        assert_eq!(track.id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn track_query_answers_unavailable_on_shutdown() {
        let source = ScriptedSource::new([failure(), failure(), failure()]);
        let shutdown = CancellationToken::new();
        let state = BridgeState {
            poller: Arc::new(Poller::new(source, &Config::default())),
            shutdown: shutdown.clone(),
        };

        let pending = tokio::spawn(async move {
            get_track(State(state), Query(BridgeQuery::default()))
                .await
                .into_response()
        });
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        shutdown.cancel();

        let response = pending.await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn empty_request_ids_are_replaced() {
        let id = BridgeQuery { id: Some(String::new()) }.request_id();
        assert!(!id.is_empty());
        assert_eq!(BridgeQuery { id: Some("edge".into()) }.request_id(), "edge");
    }
}
