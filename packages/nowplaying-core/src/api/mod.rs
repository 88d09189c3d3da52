//! HTTP/WebSocket API layer.
//!
//! Thin handlers over the hub and poller, the router construction for both
//! roles, and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::socket::Hub;
use crate::track::Track;

pub mod http;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The accept loop failed.
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state for the edge routes.
#[derive(Clone)]
pub struct AppState {
    /// Subscriber hub fed by the bridge relay.
    pub hub: Arc<Hub<Track>>,
    /// Core configuration.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(hub: Arc<Hub<Track>>, config: Arc<Config>) -> Self {
        Self { hub, config }
    }
}

/// Binds the listening socket. The only process-fatal failure.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serves `router` until `shutdown` fires, then drains open requests.
pub async fn start_server(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    log::info!("[Server] Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("[Server] Stopped");
    Ok(())
}
