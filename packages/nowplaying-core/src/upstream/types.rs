//! Spotify Web API response shapes and their mapping to [`Track`].
//!
//! Only the fields the service reads are modelled; everything else in the
//! responses is ignored.

use std::collections::HashMap;

use serde::Deserialize;

use crate::track::{Album, Artist, Timestamp, Track};

/// Response of the accounts service token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime of the access token, in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Error body returned by the Web API.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub status: u16,
    pub message: String,
}

/// `GET /me/player`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerState {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    /// Absent for ads, and `null` while switching devices.
    #[serde(default)]
    pub item: Option<ApiTrack>,
}

/// `GET /me/player/recently-played`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentlyPlayed {
    #[serde(default)]
    pub items: Vec<PlayHistory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayHistory {
    pub track: ApiTrack,
    pub played_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTrack {
    /// `null` for local files.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub album: Option<ApiAlbum>,
    #[serde(default)]
    pub artists: Vec<ApiArtist>,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAlbum {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub images: Vec<ApiImage>,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiArtist {
    pub name: String,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiImage {
    pub url: String,
}

fn spotify_url(urls: &HashMap<String, String>) -> String {
    urls.get("spotify").cloned().unwrap_or_default()
}

impl ApiTrack {
    fn into_track(self, is_playing: bool) -> Track {
        let album = self
            .album
            .map(|album| Album {
                id: album.id.unwrap_or_default(),
                url: spotify_url(&album.external_urls),
                image_url: album.images.into_iter().next().map(|i| i.url).unwrap_or_default(),
                name: album.name,
            })
            .unwrap_or_default();

        Track {
            id: self.id.unwrap_or_default(),
            url: spotify_url(&self.external_urls),
            title: self.name,
            is_playing,
            timestamp: None,
            played_at: None,
            artists: self
                .artists
                .into_iter()
                .map(|artist| Artist {
                    url: spotify_url(&artist.external_urls),
                    name: artist.name,
                })
                .collect(),
            album,
        }
    }
}

impl PlayerState {
    /// The playing track, or `None` when nothing is playing.
    pub fn into_track(self) -> Option<Track> {
        if !self.is_playing {
            return None;
        }
        let item = self.item?;
        let duration = item.duration_ms;
        let mut track = item.into_track(true);
        track.timestamp = Some(Timestamp {
            progress: self.progress_ms.unwrap_or(0),
            duration,
        });
        Some(track)
    }
}

impl PlayHistory {
    pub fn into_track(self) -> Track {
        let mut track = self.track.into_track(false);
        track.played_at = Some(self.played_at);
        track
    }
}
