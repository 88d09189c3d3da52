//! The "now playing" snapshot distributed to subscribers.

use serde::{Deserialize, Serialize};

/// A point-in-time description of the current (or most recent) track.
///
/// Snapshots are immutable once built; a newer snapshot replaces the old one
/// as a whole (they are shared as `Arc<Track>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Provider identifier of the track.
    pub id: String,
    /// Track title.
    pub title: String,
    /// Canonical URL of the track.
    pub url: String,
    /// Whether the track is currently playing.
    pub is_playing: bool,
    /// Playback position, only present while something is playing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// When the track was last played, only present for history entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub played_at: Option<String>,
    /// Artists credited on the track.
    #[serde(default)]
    pub artists: Vec<Artist>,
    /// Album the track belongs to.
    #[serde(default)]
    pub album: Album,
}

/// Progress and duration of the playing track, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub progress: u64,
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub url: String,
    pub image_url: String,
}

impl Track {
    /// Returns the playback progress, if the snapshot carries one.
    pub fn progress(&self) -> Option<u64> {
        self.timestamp.map(|t| t.progress)
    }

    /// Returns `true` if both snapshots describe the same track.
    pub fn same_track(&self, other: &Track) -> bool {
        self.id == other.id
    }

    /// Returns a copy of this snapshot with the progress replaced.
    ///
    /// Snapshots without a timestamp are returned unchanged.
    #[must_use]
    pub fn with_progress(&self, progress: u64) -> Track {
        let mut next = self.clone();
        if let Some(ref mut timestamp) = next.timestamp {
            timestamp.progress = progress;
        }
        next
    }

    /// Returns a copy of this snapshot with the playing flag replaced.
    #[must_use]
    pub fn with_playing(&self, is_playing: bool) -> Track {
        Track {
            is_playing,
            ..self.clone()
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Builds a playing track with the given id and progress.
    pub(crate) fn playing(id: &str, progress: u64) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Track {id}"),
            url: format!("https://open.spotify.com/track/{id}"),
            is_playing: true,
            timestamp: Some(Timestamp {
                progress,
                duration: 200_000,
            }),
            played_at: None,
            artists: vec![Artist {
                name: "Artist".into(),
                url: "https://open.spotify.com/artist/a".into(),
            }],
            album: Album::default(),
        }
    }

    /// Builds a history entry (not playing, no progress).
    pub(crate) fn idle(id: &str) -> Track {
        Track {
            is_playing: false,
            timestamp: None,
            played_at: Some("2024-05-01T12:00:00Z".into()),
            ..playing(id, 0)
        }
    }
}
