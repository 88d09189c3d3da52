//! Bridge wire event.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::BridgeError;
use crate::poller::TrackEvent;
use crate::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Change,
    Status,
    Progress,
}

/// One line of the `/bridge/listen` stream.
///
/// `id` echoes the request id the edge subscribed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub id: String,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Arc<Track>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u64>,
}

impl BridgeEvent {
    pub fn from_track_event(id: &str, event: &TrackEvent) -> Self {
        match event {
            TrackEvent::Change(track) => Self {
                id: id.to_string(),
                kind: EventKind::Change,
                track: Some(Arc::clone(track)),
                is_playing: None,
                progress: None,
            },
            TrackEvent::Status(is_playing) => Self {
                id: id.to_string(),
                kind: EventKind::Status,
                track: None,
                is_playing: Some(*is_playing),
                progress: None,
            },
            TrackEvent::Progress(progress) => Self {
                id: id.to_string(),
                kind: EventKind::Progress,
                track: None,
                is_playing: None,
                progress: Some(*progress),
            },
        }
    }

    pub fn into_track_event(self) -> Result<TrackEvent, BridgeError> {
        match self.kind {
            EventKind::Change => self
                .track
                .map(TrackEvent::Change)
                .ok_or(BridgeError::MissingTrack),
            EventKind::Status => self
                .is_playing
                .map(TrackEvent::Status)
                .ok_or(BridgeError::MissingStatus),
            EventKind::Progress => self
                .progress
                .map(TrackEvent::Progress)
                .ok_or(BridgeError::MissingProgress),
        }
    }

    /// Encodes the event as one NDJSON line, newline included.
    pub fn to_line(&self) -> Result<Bytes, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::fixtures::playing;

    #[test]
    fn progress_lines_carry_only_progress() {
        let event = BridgeEvent::from_track_event("edge-1", &TrackEvent::Progress(6000));
        let line = event.to_line().unwrap();
        assert_eq!(
            &line[..],
            br#"{"id":"edge-1","kind":"PROGRESS","progress":6000}
"#
        );
    }

    #[test]
    fn change_events_keep_the_snapshot() {
        let track = Arc::new(playing("b", 100));
        let event = BridgeEvent::from_track_event("edge-1", &TrackEvent::Change(Arc::clone(&track)));
        assert_eq!(event.kind, EventKind::Change);
        assert_eq!(event.into_track_event().unwrap(), TrackEvent::Change(track));
    }

    #[test]
    fn status_lines_carry_only_the_playing_flag() {
        let event = BridgeEvent::from_track_event("edge-1", &TrackEvent::Status(false));
        let line = event.to_line().unwrap();
        assert_eq!(
            &line[..],
            br#"{"id":"edge-1","kind":"STATUS","is_playing":false}
"#
        );

        let decoded: BridgeEvent = serde_json::from_slice(&line).unwrap();
        assert_eq!(decoded.into_track_event(), Ok(TrackEvent::Status(false)));
    }

    #[test]
    fn incomplete_events_are_rejected() {
        let change: BridgeEvent = serde_json::from_str(r#"{"id":"x","kind":"CHANGE"}"#).unwrap();
        assert_eq!(change.into_track_event(), Err(BridgeError::MissingTrack));

        let progress: BridgeEvent = serde_json::from_str(r#"{"id":"x","kind":"PROGRESS"}"#).unwrap();
        assert_eq!(progress.into_track_event(), Err(BridgeError::MissingProgress));

        let status: BridgeEvent = serde_json::from_str(r#"{"id":"x","kind":"STATUS"}"#).unwrap();
        assert_eq!(status.into_track_event(), Err(BridgeError::MissingStatus));
    }
}
