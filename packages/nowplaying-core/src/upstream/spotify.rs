//! Spotify Web API client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::types::{ErrorResponse, PlayHistory, PlayerState, RecentlyPlayed, TokenResponse};
use super::UpstreamError;
use crate::poller::TrackSource;
use crate::protocol_constants::{
    HTTP_TIMEOUT_SECS, SPOTIFY_API_BASE_URL, SPOTIFY_TOKEN_URL, TOKEN_REFRESH_MARGIN_SECS,
};
use crate::track::Track;

/// Application credentials plus the user's long-lived refresh token.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl SpotifyCredentials {
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.refresh_token.is_empty()
    }
}

impl fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    refresh_at: Instant,
}

impl AccessToken {
    fn from_response(response: TokenResponse, now: Instant) -> Self {
        let lifetime = response.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN_SECS);
        Self {
            value: response.access_token,
            refresh_at: now + Duration::from_secs(lifetime),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

/// Client for the parts of the Spotify Web API the service reads.
///
/// The access token is cached and refreshed shortly before it expires, or
/// right after the API rejects it.
pub struct SpotifyClient {
    http: Client,
    credentials: SpotifyCredentials,
    token_url: String,
    api_base: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(http: Client, credentials: SpotifyCredentials) -> Self {
        Self::with_endpoints(http, credentials, SPOTIFY_TOKEN_URL, SPOTIFY_API_BASE_URL)
    }

    /// Creates a client talking to non-default endpoints.
    pub fn with_endpoints(
        http: Client,
        credentials: SpotifyCredentials,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            token_url: token_url.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    /// Returns a valid access token, refreshing it if needed.
    async fn access_token(&self) -> Result<String, UpstreamError> {
        let mut token = self.token.lock().await;
        if let Some(ref current) = *token {
            if current.is_fresh(Instant::now()) {
                return Ok(current.value.clone());
            }
        }

        let refreshed = self.refresh().await?;
        let value = refreshed.value.clone();
        *token = Some(refreshed);
        Ok(value)
    }

    async fn refresh(&self) -> Result<AccessToken, UpstreamError> {
        log::debug!("[Spotify] Refreshing access token");

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            log::error!("[Spotify] Token refresh failed with {}: {}", status, message);
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse = response.json().await?;
        log::info!("[Spotify] Access token refreshed, valid for {}s", body.expires_in);
        Ok(AccessToken::from_response(body, Instant::now()))
    }

    /// Drops the cached token so the next request refreshes it.
    pub async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Authenticated GET. `Ok(None)` means 204 No Content.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, UpstreamError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.api_base, path);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::UNAUTHORIZED => {
                log::warn!("[Spotify] Access token rejected, will refresh");
                self.invalidate_token().await;
                Err(UpstreamError::Unauthorized)
            }
            status if status.is_success() => {
                let body = response.bytes().await?;
                serde_json::from_slice(&body)
                    .map(Some)
                    .map_err(|e| UpstreamError::Decode(e.to_string()))
            }
            status => {
                let body = response.bytes().await.unwrap_or_default();
                let message = serde_json::from_slice::<ErrorResponse>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
                Err(UpstreamError::Status {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// `GET /me/player`. `None` when no device is active.
    pub async fn player_state(&self) -> Result<Option<PlayerState>, UpstreamError> {
        self.get("/me/player").await
    }

    /// Most recent listening history entry, if any.
    pub async fn last_played(&self) -> Result<Option<PlayHistory>, UpstreamError> {
        let history: Option<RecentlyPlayed> = self.get("/me/player/recently-played?limit=1").await?;
        Ok(history.and_then(|h| h.items.into_iter().next()))
    }

    /// The playing track, or the last played one when nothing is playing.
    pub async fn now_playing(&self) -> Result<Track, UpstreamError> {
        if let Some(track) = self.player_state().await?.and_then(PlayerState::into_track) {
            return Ok(track);
        }

        self.last_played()
            .await?
            .map(PlayHistory::into_track)
            .ok_or(UpstreamError::NoHistory)
    }
}

#[async_trait]
impl TrackSource for SpotifyClient {
    async fn fetch(&self) -> Result<Track, UpstreamError> {
        self.now_playing().await
    }

    async fn recently_played(&self) -> Result<Track, UpstreamError> {
        self.last_played()
            .await?
            .map(PlayHistory::into_track)
            .ok_or(UpstreamError::NoHistory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_refresh_ahead_of_expiry() {
        let now = Instant::now();
        let token = AccessToken::from_response(
            TokenResponse {
                access_token: "abc".into(),
                expires_in: 3600,
            },
            now,
        );

        assert!(token.is_fresh(now + Duration::from_secs(54 * 60)));
        assert!(!token.is_fresh(now + Duration::from_secs(55 * 60)));
    }

    #[test]
    fn short_lived_tokens_are_never_cached() {
        let now = Instant::now();
        let token = AccessToken::from_response(
            TokenResponse {
                access_token: "abc".into(),
                expires_in: 60,
            },
            now,
        );
        assert!(!token.is_fresh(now));
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let credentials = SpotifyCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "refresh".into(),
        };
        let printed = format!("{credentials:?}");
        assert!(printed.contains("id"));
        assert!(!printed.contains("secret\""));
        assert!(!printed.contains("refresh\""));
        assert!(credentials.is_complete());
        assert!(!SpotifyCredentials::default().is_complete());
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let client = SpotifyClient::with_endpoints(
            Client::new(),
            SpotifyCredentials::default(),
            "http://localhost/token",
            "http://localhost/v1/",
        );
        assert_eq!(client.api_base, "http://localhost/v1");
    }
}
