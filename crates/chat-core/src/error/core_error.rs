//! Core errors - programmer errors raised synchronously by tracked entities

use thiserror::Error;

/// Errors raised by the entity edit state machine
///
/// These are returned immediately, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The entity is Locked; property writes require an open edit session
    #[error("Entity is locked; call begin_changes first")]
    Locked,

    /// The entity received a deletion signal and rejects further edits
    #[error("Entity has been deleted")]
    Deleted,

    /// An edit session is already open on this entity
    #[error("An edit session is already in progress")]
    EditInProgress,

    /// The open change set is being sent and cannot be touched
    #[error("Changes are being applied")]
    ApplyInProgress,
}

impl CoreError {
    /// Check if waiting for the entity to become Locked again could resolve this
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::EditInProgress | Self::ApplyInProgress)
    }
}
