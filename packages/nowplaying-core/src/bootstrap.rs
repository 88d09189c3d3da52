//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Each process role gets its
//! own container:
//!
//! - **Producer**: the upstream client, the single poller, and the bridge
//!   routes that expose it
//! - **Edge**: the subscriber hub, the bridge client, and the relay that
//!   feeds one into the other

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::http::{create_edge_router, create_producer_router};
use crate::api::AppState;
use crate::bridge::{run_relay, BridgeClient};
use crate::config::Config;
use crate::error::{NowPlayingError, NowPlayingResult};
use crate::poller::{Poller, TrackSource};
use crate::protocol_constants::HTTP_TIMEOUT_SECS;
use crate::socket::Hub;
use crate::track::Track;
use crate::upstream::{SpotifyClient, SpotifyCredentials};

/// Services of a producer process.
pub struct ProducerServices {
    /// The one poller of this process.
    pub poller: Arc<Poller>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl ProducerServices {
    /// Router exposing the bridge and health routes.
    pub fn router(&self) -> Router {
        create_producer_router(Arc::clone(&self.poller), self.cancel_token.clone())
    }

    /// Spawns the poll loop.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        let poller = Arc::clone(&self.poller);
        let cancel = self.cancel_token.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    }

    /// Stops the poll loop and ends open bridge streams.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Shutting down producer");
        self.cancel_token.cancel();
    }
}

/// Services of an edge process.
pub struct EdgeServices {
    /// Subscriber hub.
    pub hub: Arc<Hub<Track>>,
    /// Client for the producer's bridge routes.
    pub bridge: BridgeClient,
    /// Core configuration.
    pub config: Arc<Config>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl EdgeServices {
    /// Router exposing the subscriber socket and the HTTP routes.
    pub fn router(&self) -> Router {
        create_edge_router(AppState::new(Arc::clone(&self.hub), Arc::clone(&self.config)))
    }

    /// Spawns the bridge relay.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        tokio::spawn(run_relay(
            Arc::clone(&self.hub),
            self.bridge.clone(),
            self.config.bridge_reconnect_delay(),
            self.cancel_token.clone(),
        ))
    }

    /// Closes every subscriber normally, then stops the relay.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Shutting down edge");
        self.hub.close();
        self.cancel_token.cancel();
    }
}

/// Creates the shared HTTP client.
///
/// Only the connect phase is bounded here: the bridge's event stream is
/// long-lived, so upstream requests set their own timeouts.
fn create_http_client() -> NowPlayingResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|e| NowPlayingError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Wires a producer around the Spotify client.
///
/// # Errors
///
/// Returns a configuration error if any credential is missing.
pub fn bootstrap_producer(
    config: &Config,
    credentials: SpotifyCredentials,
) -> NowPlayingResult<ProducerServices> {
    if !credentials.is_complete() {
        return Err(NowPlayingError::Configuration(
            "Spotify client_id, client_secret and refresh_token are required".into(),
        ));
    }

    let http_client = create_http_client()?;
    let spotify = Arc::new(SpotifyClient::new(http_client, credentials));
    Ok(bootstrap_producer_with_source(config, spotify))
}

/// Wires a producer around an arbitrary snapshot source.
pub fn bootstrap_producer_with_source(
    config: &Config,
    source: Arc<dyn TrackSource>,
) -> ProducerServices {
    ProducerServices {
        poller: Arc::new(Poller::new(source, config)),
        cancel_token: CancellationToken::new(),
    }
}

/// Wires an edge attached to the producer at `producer_url`.
///
/// # Errors
///
/// Returns a configuration error if the producer URL is empty.
pub fn bootstrap_edge(config: &Config, producer_url: &str) -> NowPlayingResult<EdgeServices> {
    if producer_url.trim().is_empty() {
        return Err(NowPlayingError::Configuration(
            "producer_url is required for the edge role".into(),
        ));
    }

    let http_client = create_http_client()?;
    Ok(EdgeServices {
        hub: Arc::new(Hub::new(config.heartbeat_timeout())),
        bridge: BridgeClient::new(http_client, producer_url),
        config: Arc::new(config.clone()),
        cancel_token: CancellationToken::new(),
    })
}
