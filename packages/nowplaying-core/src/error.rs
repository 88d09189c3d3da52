//! Centralized error types for the now-playing core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! Per-concern errors live next to the code that raises them
//! ([`TransportError`](crate::socket::TransportError),
//! [`ProtocolError`](crate::socket::ProtocolError),
//! [`UpstreamError`](crate::upstream::UpstreamError),
//! [`BridgeError`](crate::bridge::BridgeError)) and convert into
//! [`NowPlayingError`] at the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::upstream::UpstreamError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for UpstreamError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::Status { .. } => "upstream_error_status",
            Self::Unauthorized => "upstream_unauthorized",
            Self::Decode(_) => "upstream_decode_error",
            Self::NoHistory => "upstream_no_history",
        }
    }
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "bridge_http_failed",
            Self::Status(_) => "bridge_error_status",
            Self::Decode(_) => "bridge_decode_error",
            Self::MissingTrack => "bridge_missing_track",
            Self::MissingStatus => "bridge_missing_status",
            Self::MissingProgress => "bridge_missing_progress",
        }
    }
}

/// Application-wide error type for the now-playing service.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum NowPlayingError {
    /// The upstream provider could not be queried.
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// The producer bridge could not be reached or returned garbage.
    #[error("Bridge request failed: {0}")]
    Bridge(String),

    /// No snapshot has been received yet.
    #[error("No track state available yet")]
    NoState,

    /// The request was abandoned because the server is stopping.
    #[error("Server is shutting down")]
    ShuttingDown,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (missing required settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NowPlayingError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "upstream_error",
            Self::Bridge(_) => "bridge_error",
            Self::NoState => "no_state",
            Self::ShuttingDown => "shutting_down",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream(_) | Self::Bridge(_) => StatusCode::BAD_GATEWAY,
            Self::NoState | Self::ShuttingDown | Self::Configuration(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type NowPlayingResult<T> = Result<T, NowPlayingError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for NowPlayingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<UpstreamError> for NowPlayingError {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<BridgeError> for NowPlayingError {
    fn from(err: BridgeError) -> Self {
        Self::Bridge(err.to_string())
    }
}
