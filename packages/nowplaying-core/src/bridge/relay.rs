//! Relays bridge events into the local hub.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use tokio_util::sync::CancellationToken;

use super::client::{BridgeClient, EventStream};
use super::BridgeError;
use crate::error::ErrorCode;
use crate::poller::TrackEvent;
use crate::socket::Hub;
use crate::track::Track;

/// Applies one event to the hub and broadcasts it.
///
/// Progress and status events also update the held snapshot so late joiners
/// see the current position and playing flag. Returns the number of subscribers reached.
pub fn apply_event(hub: &Hub<Track>, event: TrackEvent) -> usize {
    tracing::debug!(?event, "relayed_event");
    match event {
        TrackEvent::Change(track) => hub.publish_change(track),
        TrackEvent::Status(is_playing) => {
            if let Some(current) = hub.state() {
                hub.set_state(current.with_playing(is_playing));
            }
            hub.publish_status(is_playing)
        }
        TrackEvent::Progress(progress) => {
            if let Some(current) = hub.state() {
                hub.set_state(current.with_progress(progress));
            }
            hub.publish_progress(progress)
        }
    }
}

/// Seeds the hub with a point-query snapshot.
///
/// Only broadcasts when it replaces a different known track, which happens
/// when the edge reconnects after missing a change.
fn seed(hub: &Hub<Track>, track: Track) {
    let track = Arc::new(track);
    let changed = hub.state().is_some_and(|current| !current.same_track(&track));
    if changed {
        hub.publish_change(track);
    } else {
        hub.set_shared(track);
    }
}

/// Consumes an event stream until it ends, fails, or `cancel` fires.
pub async fn forward_events(
    hub: &Hub<Track>,
    mut events: EventStream,
    cancel: &CancellationToken,
) -> Result<(), BridgeError> {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                apply_event(hub, event.into_track_event()?);
            }
            Some(Err(e)) => return Err(e),
            None => return Ok(()),
        }
    }
}

async fn connect_and_forward(
    hub: &Hub<Track>,
    client: &BridgeClient,
    cancel: &CancellationToken,
) -> Result<(), BridgeError> {
    // Subscribe first so nothing is missed between the seed and the stream.
    let events = client.listen().await?;
    let track = client.get_track().await?;
    log::info!("[Bridge] Connected, current track {}", track.id);
    seed(hub, track);

    forward_events(hub, events, cancel).await
}

/// Keeps the edge attached to the producer until `cancel` fires.
///
/// Every time the stream ends or fails, waits `reconnect_delay` and starts
/// over with a fresh seed.
pub async fn run_relay(
    hub: Arc<Hub<Track>>,
    client: BridgeClient,
    reconnect_delay: Duration,
    cancel: CancellationToken,
) {
    log::info!("[Bridge] Relay {} started", client.id());

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connect_and_forward(&hub, &client, &cancel) => result,
        };

        if cancel.is_cancelled() {
            break;
        }
        match result {
            Ok(()) => log::warn!("[Bridge] Event stream ended, reconnecting"),
            Err(e) => log::warn!("[Bridge] Event stream failed ({}), reconnecting: {}", e.code(), e),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    log::info!("[Bridge] Relay stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeEvent, EventKind};
    use crate::track::fixtures::{idle, playing};

    fn hub() -> Hub<Track> {
        Hub::new(Duration::from_secs(35))
    }

    fn events(items: Vec<Result<BridgeEvent, BridgeError>>) -> EventStream {
        Box::pin(futures::stream::iter(items))
    }

    #[test]
    fn change_replaces_the_snapshot() {
        let hub = hub();
        apply_event(&hub, TrackEvent::Change(Arc::new(playing("b", 100))));
        assert_eq!(hub.state().unwrap().id, "b");
    }

    #[test]
    fn progress_advances_the_held_snapshot() {
        let hub = hub();
        hub.set_state(playing("a", 1000));
        apply_event(&hub, TrackEvent::Progress(6000));
        assert_eq!(hub.state().unwrap().progress(), Some(6000));
    }

    #[test]
    fn status_flips_the_held_snapshot() {
        let hub = hub();
        hub.set_state(playing("a", 1000));
        apply_event(&hub, TrackEvent::Status(false));

        let state = hub.state().unwrap();
        assert_eq!(state.id, "a");
        assert!(!state.is_playing);
    }

    #[test]
    fn progress_without_state_is_only_broadcast() {
        let hub = hub();
        assert_eq!(apply_event(&hub, TrackEvent::Progress(10)), 0);
        assert!(!hub.has_state());
    }

    #[test]
    fn seeding_keeps_quiet_unless_the_track_changed() {
        let hub = hub();
        seed(&hub, idle("a"));
        assert_eq!(hub.state().unwrap().id, "a");

        seed(&hub, playing("a", 5));
        assert!(hub.state().unwrap().is_playing);

        seed(&hub, playing("b", 5));
        assert_eq!(hub.state().unwrap().id, "b");
    }

    #[tokio::test]
    async fn forwarding_applies_events_in_order() {
        let hub = hub();
        let stream = events(vec![
            Ok(BridgeEvent::from_track_event(
                "e",
                &TrackEvent::Change(Arc::new(playing("b", 0))),
            )),
            Ok(BridgeEvent::from_track_event("e", &TrackEvent::Progress(900))),
        ]);

        forward_events(&hub, stream, &CancellationToken::new())
            .await
            .unwrap();
        let state = hub.state().unwrap();
        assert_eq!(state.id, "b");
        assert_eq!(state.progress(), Some(900));
    }

    #[tokio::test]
    async fn malformed_events_stop_forwarding() {
        let hub = hub();
        let stream = events(vec![Ok(BridgeEvent {
            id: "e".into(),
            kind: EventKind::Change,
            track: None,
            is_playing: None,
            progress: None,
        })]);

        let result = forward_events(&hub, stream, &CancellationToken::new()).await;
        assert_eq!(result, Err(BridgeError::MissingTrack));
    }

    #[tokio::test]
    async fn cancellation_stops_a_pending_stream() {
        let hub = hub();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pending: EventStream = Box::pin(futures::stream::pending());
        assert_eq!(forward_events(&hub, pending, &cancel).await, Ok(()));
    }
}
