//! Upstream snapshot provider.
//!
//! The Spotify Web API client refreshes an OAuth access token from a
//! long-lived refresh token and maps the player / history responses into
//! [`Track`](crate::track::Track) snapshots. It plugs into the poller as a
//! [`TrackSource`](crate::poller::TrackSource).

mod spotify;
pub mod types;

use thiserror::Error;

pub use spotify::{SpotifyClient, SpotifyCredentials};

/// Errors raised while querying the upstream provider.
///
/// None of these ever reach subscribers; the poller backs off and keeps the
/// last known snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The HTTP request itself failed (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The provider answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The access token was rejected; it is dropped and refreshed next time.
    #[error("access token rejected")]
    Unauthorized,

    /// The response body did not match the expected shape.
    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// Nothing is playing and the listening history is empty.
    #[error("no playback history available")]
    NoHistory,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}
