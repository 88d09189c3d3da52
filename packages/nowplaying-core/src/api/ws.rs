//! WebSocket upgrade for subscribers.

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::http::origin_allowed;
use crate::api::AppState;
use crate::socket::{split_websocket, Hub};
use crate::track::Track;

/// Upgrades the request and hands the socket to the hub.
///
/// Browsers do not preflight upgrades, so the configured origins are checked
/// here. Requests without an `Origin` header come from non-browser clients
/// and are let through.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or("");
        if !origin_allowed(&state.config.cors_origins, origin) {
            log::warn!("[WS] Rejected upgrade from origin {:?}", origin);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub<Track>>) {
    let (sink, stream) = split_websocket(socket);
    hub.handle(sink, stream).await;
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_util::sync::CancellationToken;

    use crate::api::http::create_edge_router;
    use crate::api::{bind, start_server, AppState};
    use crate::config::Config;
    use crate::socket::Hub;

    async fn serve_edge(origins: &[&str]) -> (SocketAddr, CancellationToken) {
        let config = Config {
            cors_origins: origins.iter().map(|o| o.to_string()).collect(),
            ..Config::default()
        };
        let state = AppState::new(
            std::sync::Arc::new(Hub::new(Duration::from_secs(35))),
            std::sync::Arc::new(config),
        );

        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(start_server(listener, create_edge_router(state), shutdown.clone()));
        (addr, shutdown)
    }

    /// Sends a raw upgrade request and returns the response status code.
    async fn upgrade_status(addr: SocketAddr, origin: Option<&str>) -> u16 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let origin = origin
            .map(|o| format!("Origin: {o}\r\n"))
            .unwrap_or_default();
        let request = format!(
            "GET /socket HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             {origin}\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let head = String::from_utf8_lossy(&buf[..n]).into_owned();
        head.split_whitespace().nth(1).unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn foreign_origins_are_refused_before_the_upgrade() {
        let (addr, shutdown) = serve_edge(&["https://listen.example.com"]).await;
        assert_eq!(upgrade_status(addr, Some("https://evil.test")).await, 403);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn trusted_origins_and_non_browser_clients_are_upgraded() {
        let (addr, shutdown) = serve_edge(&["https://listen.example.com"]).await;
        assert_eq!(
            upgrade_status(addr, Some("https://listen.example.com")).await,
            101
        );
        assert_eq!(upgrade_status(addr, None).await, 101);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn any_origin_is_upgraded_when_none_are_configured() {
        let (addr, shutdown) = serve_edge(&[]).await;
        assert_eq!(upgrade_status(addr, Some("https://evil.test")).await, 101);
        shutdown.cancel();
    }
}
