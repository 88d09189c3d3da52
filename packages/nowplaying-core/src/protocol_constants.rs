//! Fixed protocol constants that should NOT be changed.
//!
//! These values are part of the subscriber wire contract or of the upstream
//! provider's API. Tunable cadences live in [`Config`](crate::config::Config)
//! and only use the values below as defaults.

// ─────────────────────────────────────────────────────────────────────────────
// Subscriber Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Default heartbeat window advertised in HELLO (seconds).
///
/// Clients are expected to send HEARTBEAT at least this often. The server
/// pings once after one silent window and disconnects after a second.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 35;

/// Delay before re-attempting a send on a connection that is not alive yet.
pub const SEND_RETRY_DELAY_MS: u64 = 20;

/// Number of deferred re-sends before a message is dropped.
pub const MAX_SEND_RETRIES: u8 = 5;

/// Deadline for the best-effort close handshake (seconds).
pub const CLOSE_HANDSHAKE_TIMEOUT_SECS: u64 = 1;

/// Capacity of the per-connection inbound message queue.
pub const INBOUND_QUEUE_CAPACITY: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Polling
// ─────────────────────────────────────────────────────────────────────────────

/// Default upstream poll interval (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Amount the poll interval grows by on each failed fetch (seconds).
pub const POLL_BACKOFF_STEP_SECS: u64 = 1;

/// Maximum number of backoff steps above the default interval.
pub const POLL_BACKOFF_MAX_STEPS: u32 = 3;

/// Capacity of the producer's event fan-out channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Bridge
// ─────────────────────────────────────────────────────────────────────────────

/// Delay between edge reconnect attempts to the producer (milliseconds).
pub const BRIDGE_RECONNECT_DELAY_MS: u64 = 2000;

/// Content type of the listen stream (one JSON event per line).
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// ─────────────────────────────────────────────────────────────────────────────
// Spotify Web API
// ─────────────────────────────────────────────────────────────────────────────

/// OAuth token endpoint (refresh-token grant).
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Base URL of the Web API.
pub const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Access tokens are valid for one hour; refresh a little early.
pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 5 * 60;

/// Timeout for upstream provider requests, and connect timeout for the
/// shared HTTP client (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "nowplaying";
