//! Application error types
//!
//! The error every layer converts into at the client boundary. Its main job
//! is to tell the supervisor whether a failure is fatal.

use chat_core::CoreError;
use std::fmt;

use crate::config::ConfigError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Authentication errors
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    // Gateway errors
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Gateway closed the session: {0}")]
    SessionClosed(String),

    // REST errors
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request failed with status {status}")]
    Request { status: u16, body: String },

    // Local edit errors
    #[error(transparent)]
    Entity(#[from] CoreError),

    // Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Check whether the client cannot continue and must be restarted
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::SessionClosed(_) | Self::Config(_)
        )
    }

    /// Get a stable error code for logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Protocol(_) => "PROTOCOL_VIOLATION",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Request { .. } => "REQUEST_FAILED",
            Self::Entity(_) => "ENTITY_STATE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create a connection error
    #[must_use]
    pub fn connection(msg: impl fmt::Display) -> Self {
        Self::Connection(msg.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
