//! Longshot API - HTTP adapter for the telemetry/control server
//!
//! Implements the `IRemoteApi` port from `longshot-core` over JSON/HTTP:
//! - Path declaration (`/v1/redefine_paths/`)
//! - Order polling and confirmation (`/v1/get_orders/`, `/v1/confirm_orders/`)
//! - Sample upload (`/v1/sync_values/`)
//!
//! ## Modules
//!
//! - [`client`] - The `reqwest` based [`LongshotClient`]

pub mod client;

pub use client::LongshotClient;

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when communicating with the Longshot API
#[derive(Debug, Error)]
pub enum ApiError {
    /// The device credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The device may not access the requested resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The endpoint or device does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Value of the `Retry-After` header, when the server sent one
        retry_after: Option<Duration>,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Any other non-success status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// A network-level error occurred (connect, timeout, TLS)
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// HTTP status behind this error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::TooManyRequests { .. } => Some(429),
            ApiError::ServerError { status, .. } | ApiError::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            ApiError::NetworkError(err) => err.status().map(|s| s.as_u16()),
            ApiError::InvalidResponse(_) => None,
        }
    }
}
