//! REST errors

use chat_common::AppError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`RestClient`](crate::RestClient)
///
/// Statuses other than 401, 404 and 429 are not errors; they come back as a
/// [`RestResponse`](crate::RestResponse).
#[derive(Debug, Error)]
pub enum RestError {
    /// HTTP 401; the client has also signalled a supervisor restart
    #[error("Unauthorized ({status})")]
    Unauthorized { status: u16, body: String },

    /// HTTP 404 below the missing-route threshold
    #[error("Not found: {route}")]
    NotFound {
        route: String,
        status: u16,
        body: String,
    },

    /// The route returned 404 repeatedly and is no longer requested
    #[error("Route marked missing: {route}")]
    MissingRoute { route: String },

    /// HTTP 429 after the retry policy gave up
    #[error("Rate limited on {route}, retry after {retry_after:?} (global: {global})")]
    RateLimited {
        route: String,
        retry_after: Duration,
        global: bool,
        status: u16,
        body: String,
    },

    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured base URL or a route produced an invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl RestError {
    /// HTTP status carried by this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status, .. }
            | Self::NotFound { status, .. }
            | Self::RateLimited { status, .. } => Some(*status),
            Self::MissingRoute { .. } => Some(404),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::InvalidUrl(_) => None,
        }
    }

    /// Response body carried by this error, if any
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { body, .. }
            | Self::NotFound { body, .. }
            | Self::RateLimited { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<RestError> for AppError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::Unauthorized { body, .. } => AppError::Unauthorized(body),
            RestError::NotFound { route, .. } | RestError::MissingRoute { route } => {
                AppError::NotFound(route)
            }
            RestError::RateLimited { retry_after, .. } => AppError::RateLimited {
                retry_after_ms: retry_after.as_millis() as u64,
            },
            RestError::Transport(e) => AppError::connection(e),
            other @ (RestError::Decode(_) | RestError::InvalidUrl(_)) => AppError::internal(other),
        }
    }
}
