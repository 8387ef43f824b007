//! Connection state and session notices

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Gateway session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// No socket; initial state
    #[default]
    Disconnected,
    /// Opening the socket and waiting for Hello
    Connecting,
    /// Identify about to be sent
    Identifying,
    /// Resume about to be sent
    Resuming,
    /// Identify or Resume sent, waiting for READY or RESUMED
    AwaitingAck,
    /// Handshake complete; heartbeat and receive loops running
    Connected,
    /// Tearing down the old socket before a new handshake
    Reconnecting,
    /// Unrecoverable; no further transitions
    Terminated,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::AwaitingAck => "awaiting_ack",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications broadcast to session observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    StateChanged(ConnectionState),
    /// A heartbeat was acknowledged
    Alive { latency: Duration },
    /// No ACK arrived before the next heartbeat was due
    HeartbeatTimedOut,
    Reconnecting { resume: bool },
    Fatal { reason: String },
}
