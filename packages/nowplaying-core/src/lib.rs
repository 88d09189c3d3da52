//! Now-playing core - live-state distribution engine.
//!
//! Distributes a single, frequently changing piece of state ("what track is
//! playing") from one upstream source to many WebSocket subscribers, without
//! querying the upstream once per subscriber.
//!
//! # Architecture
//!
//! Data flows Poller (producer process) -> Bridge -> Hub (edge process) ->
//! Registry -> Connections -> subscribers.
//!
//! - [`poller`]: periodic upstream fetches turned into change events
//! - [`bridge`]: HTTP/NDJSON streaming between producer and edge processes
//! - [`socket`]: subscriber protocol, connections, registry and hub
//! - [`upstream`]: Spotify Web API client
//! - [`api`]: HTTP routes and server startup
//! - [`bootstrap`]: composition root for both roles
//! - [`error`]: centralized error types

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod error;
pub mod poller;
pub mod protocol_constants;
pub mod socket;
pub mod track;
pub mod upstream;

// Re-export commonly used types at the crate root
pub use config::Config;
pub use error::{ErrorCode, NowPlayingError, NowPlayingResult};
pub use poller::{PollRate, Poller, TrackEvent, TrackSource};
pub use socket::{CloseCode, Connection, Hub, Message, OpCode, Pool};
pub use track::{Album, Artist, Timestamp, Track};
pub use upstream::{SpotifyClient, SpotifyCredentials, UpstreamError};

// Re-export bridge types
pub use bridge::{BridgeClient, BridgeError, BridgeEvent, EventKind};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_edge, bootstrap_producer, EdgeServices, ProducerServices};

// Re-export API types
pub use api::{bind, start_server, AppState, ServerError};
