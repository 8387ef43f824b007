//! Supervisor signalling
//!
//! The client never exits the process itself. Fatal conditions are reported
//! here and the owner of the receiver decides what to do.

use tokio::sync::mpsc;

/// A request to the external supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorSignal {
    /// Unrecoverable failure; the process should be restarted
    Restart { reason: String },
    /// Orderly shutdown requested
    Exit { reason: String },
}

impl SupervisorSignal {
    /// Process exit code for this signal
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Restart { .. } => 1,
            Self::Exit { .. } => 0,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Restart { reason } | Self::Exit { reason } => reason,
        }
    }
}

/// Sending half, cloned into every component that can escalate
#[derive(Debug, Clone)]
pub struct Supervisor {
    tx: mpsc::UnboundedSender<SupervisorSignal>,
}

/// Receiving half, owned by whoever runs the client
pub type SupervisorReceiver = mpsc::UnboundedReceiver<SupervisorSignal>;

impl Supervisor {
    /// Create a connected supervisor pair
    pub fn channel() -> (Self, SupervisorReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A supervisor nobody listens to
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Ask for a process restart
    pub fn restart(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(reason = %reason, "Requesting supervisor restart");
        self.send(SupervisorSignal::Restart { reason });
    }

    /// Ask for an orderly exit
    pub fn exit(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::info!(reason = %reason, "Requesting supervisor exit");
        self.send(SupervisorSignal::Exit { reason });
    }

    fn send(&self, signal: SupervisorSignal) {
        if self.tx.send(signal).is_err() {
            tracing::debug!("Supervisor receiver dropped; signal ignored");
        }
    }
}
