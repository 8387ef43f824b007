//! Gateway errors

use crate::protocol::{ClientCloseReason, CloseAction, CloseCode, OpCode};
use chat_common::AppError;
use thiserror::Error;

/// Errors raised by the gateway session
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The socket could not be opened or broke mid-handshake
    #[error("Connection error: {0}")]
    Connection(String),

    /// The socket did not open within the connect timeout
    #[error("Connection timed out")]
    ConnectTimeout,

    /// The server sent something other than what the handshake expects
    #[error("Protocol violation: expected {expected}, received {received}")]
    ProtocolViolation { expected: &'static str, received: String },

    /// The handshake did not finish within the handshake timeout
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// The server rejected the session during the handshake
    #[error("Session invalidated by server")]
    InvalidSession,

    /// A frame was not a valid gateway envelope
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A compressed frame could not be inflated
    #[error("Compression error: {0}")]
    Compression(String),

    /// The server closed the socket
    #[error("Connection closed ({code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    /// The session has been terminated and accepts no further work
    #[error("Session terminated")]
    Terminated,

    /// The operation needs a connected session
    #[error("Session not connected")]
    NotConnected,

    /// A client command was rejected before it was sent
    #[error("Invalid payload: {0}")]
    InvalidPayload(&'static str),
}

impl GatewayError {
    /// Build a protocol violation from the opcode actually received
    pub fn unexpected(expected: &'static str, op: OpCode, event: Option<&str>) -> Self {
        let received = match event {
            Some(name) => format!("{op} {name}"),
            None => op.to_string(),
        };
        Self::ProtocolViolation { expected, received }
    }

    /// Whether no reconnect can recover from this error
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Closed { code, .. } => CloseCode::classify(*code) == CloseAction::Fatal,
            Self::Terminated => true,
            _ => false,
        }
    }

    /// Close reason to send when this error aborts a connection
    #[must_use]
    pub fn to_close_reason(&self) -> ClientCloseReason {
        match self {
            Self::ProtocolViolation { .. } | Self::Decode(_) | Self::Compression(_) => {
                ClientCloseReason::ProtocolViolation
            }
            Self::Terminated => ClientCloseReason::Terminate,
            _ => ClientCloseReason::Reconnecting,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Closed { code, reason } if CloseCode::classify(code) == CloseAction::Fatal => {
                match code.and_then(CloseCode::from_u16) {
                    Some(CloseCode::AuthenticationFailed) => AppError::Unauthorized(reason),
                    _ => AppError::SessionClosed(reason),
                }
            }
            GatewayError::Terminated => AppError::SessionClosed("terminated".to_string()),
            GatewayError::ProtocolViolation { .. } | GatewayError::Decode(_) => {
                AppError::Protocol(err.to_string())
            }
            other => AppError::Connection(other.to_string()),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
