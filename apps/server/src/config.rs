//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::{Context, Result};
use nowplaying_core::SpotifyCredentials;
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    /// Override: `NOWPLAYING_BIND_HOST`
    pub bind_host: IpAddr,

    /// Port to bind the HTTP server to.
    /// Override: `NOWPLAYING_BIND_PORT`
    pub bind_port: u16,

    /// Base URL of the producer's bridge routes (edge role only).
    /// Override: `NOWPLAYING_PRODUCER_URL`
    pub producer_url: String,

    /// Spotify application credentials (producer role only).
    /// Overrides: `NOWPLAYING_SPOTIFY_CLIENT_ID`, `NOWPLAYING_SPOTIFY_CLIENT_SECRET`,
    /// `NOWPLAYING_SPOTIFY_REFRESH_TOKEN`
    pub spotify: SpotifyCredentials,

    /// Default upstream poll interval in seconds.
    /// Override: `NOWPLAYING_POLL_INTERVAL`
    pub poll_interval_secs: u64,

    /// Heartbeat window advertised to subscribers, in seconds.
    /// Override: `NOWPLAYING_HEARTBEAT_TIMEOUT`
    pub heartbeat_timeout_secs: u64,

    /// Delay before the edge reconnects to the producer, in milliseconds.
    pub bridge_reconnect_delay_ms: u64,

    /// Origin prefixes allowed to call the edge routes. Empty allows any.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = nowplaying_core::Config::default();
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 3000,
            producer_url: String::new(),
            spotify: SpotifyCredentials::default(),
            poll_interval_secs: core.poll_interval_secs,
            heartbeat_timeout_secs: core.heartbeat_timeout_secs,
            bridge_reconnect_delay_ms: core.bridge_reconnect_delay_ms,
            cors_origins: core.cors_origins,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies overrides looked up through `var`.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("NOWPLAYING_BIND_HOST").and_then(|v| v.parse().ok()) {
            self.bind_host = host;
        }
        if let Some(port) = var("NOWPLAYING_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }
        if let Some(url) = var("NOWPLAYING_PRODUCER_URL") {
            self.producer_url = url;
        }
        if let Some(id) = var("NOWPLAYING_SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = id;
        }
        if let Some(secret) = var("NOWPLAYING_SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = secret;
        }
        if let Some(token) = var("NOWPLAYING_SPOTIFY_REFRESH_TOKEN") {
            self.spotify.refresh_token = token;
        }
        if let Some(secs) = var("NOWPLAYING_POLL_INTERVAL").and_then(|v| v.parse().ok()) {
            self.poll_interval_secs = secs;
        }
        if let Some(secs) = var("NOWPLAYING_HEARTBEAT_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.heartbeat_timeout_secs = secs;
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.bind_port)
    }

    /// Converts to nowplaying-core's Config type.
    pub fn to_core_config(&self) -> nowplaying_core::Config {
        nowplaying_core::Config {
            poll_interval_secs: self.poll_interval_secs,
            heartbeat_timeout_secs: self.heartbeat_timeout_secs,
            bridge_reconnect_delay_ms: self.bridge_reconnect_delay_ms,
            cors_origins: self.cors_origins.clone(),
            ..Default::default()
        }
    }
}
