//! Tracked entities
//!
//! A `TrackedEntity` wraps one cached domain object and arbitrates between the
//! two paths that write to it. Push updates land only while it is Locked;
//! local edits happen only while it is Editable. Opening an edit session flips
//! it to Editable, and applying or undoing flips it back.

use super::{ApplyError, ChangeSender, ChangeSet};
use chat_core::{CoreError, Deletable, Entity, FieldValue, Mutable, NetworkSynced, Snapshot, Snowflake};
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::Notify;

/// Edit state of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditState {
    /// Push updates allowed, local writes rejected
    Locked,
    /// Held by a local edit session
    Editable,
    /// Editable, with the change set on its way to the server
    Applying,
    /// Received a deletion signal; absorbing
    Deleted,
}

impl EditState {
    /// Whether a local edit session currently holds the entity
    #[must_use]
    pub const fn is_held(self) -> bool {
        matches!(self, Self::Editable | Self::Applying)
    }
}

impl fmt::Display for EditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::Editable => write!(f, "editable"),
            Self::Applying => write!(f, "applying"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// What happened to a push update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// First sighting; the entity was added to the cache
    Created,
    /// Merged into the cached copy
    Applied,
    /// Dropped because a local edit session holds the entity
    Discarded,
    /// Dropped because the entity was deleted
    Deleted,
}

struct State<E: Mutable> {
    entity: E,
    mode: EditState,
    changes: ChangeSet<E::Value>,
    discarded: u64,
}

/// A cached entity with transactional local edits
pub struct TrackedEntity<E: Mutable> {
    id: Snowflake,
    state: Mutex<State<E>>,
    /// Woken whenever the entity leaves an edit session
    released: Notify,
}

impl<E: Mutable> TrackedEntity<E> {
    pub fn new(entity: E) -> Self {
        Self {
            id: entity.id(),
            state: Mutex::new(State {
                entity,
                mode: EditState::Locked,
                changes: ChangeSet::new(),
                discarded: 0,
            }),
            released: Notify::new(),
        }
    }

    pub fn id(&self) -> Snowflake {
        self.id
    }

    pub fn state(&self) -> EditState {
        self.state.lock().mode
    }

    pub fn is_deleted(&self) -> bool {
        self.state() == EditState::Deleted
    }

    /// Run `f` against the current entity
    pub fn read<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.state.lock().entity)
    }

    /// Current value of one field
    pub fn get(&self, field: <E::Value as FieldValue>::Field) -> E::Value {
        self.state.lock().entity.get(field)
    }

    /// Fields touched by the open edit session
    pub fn pending_changes(&self) -> usize {
        self.state.lock().changes.len()
    }

    /// Push updates dropped because an edit session held the entity
    pub fn discarded_updates(&self) -> u64 {
        self.state.lock().discarded
    }

    // =========================================================================
    // Local edit path
    // =========================================================================

    /// Open an edit session: Locked -> Editable
    pub fn begin_changes(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        match state.mode {
            EditState::Locked => {
                state.mode = EditState::Editable;
                state.changes.clear();
                tracing::trace!(entity_id = %self.id, "Edit session opened");
                Ok(())
            }
            EditState::Editable | EditState::Applying => Err(CoreError::EditInProgress),
            EditState::Deleted => Err(CoreError::Deleted),
        }
    }

    /// Open an edit session, waiting for any current one to finish
    pub async fn begin_changes_wait(&self) -> Result<(), CoreError> {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            match self.begin_changes() {
                Err(e) if e.is_transient() => released.await,
                other => return other,
            }
        }
    }

    /// Write one field during an edit session
    pub fn set_property(&self, value: E::Value) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        match state.mode {
            EditState::Editable => {}
            EditState::Locked => return Err(CoreError::Locked),
            EditState::Applying => return Err(CoreError::ApplyInProgress),
            EditState::Deleted => return Err(CoreError::Deleted),
        }

        let State {
            entity, changes, ..
        } = &mut *state;
        let field = value.field();
        changes.record(value.snapshot(), || entity.get(field));
        entity.set(value);
        Ok(())
    }

    /// Send the open change set and close the session
    ///
    /// An empty change set closes the session without calling the sender. On
    /// any failure every touched field is restored before the error returns.
    pub async fn apply_changes<S>(&self, sender: &S, reason: Option<&str>) -> Result<(), ApplyError>
    where
        S: ChangeSender<E::Value> + ?Sized,
    {
        let changes = {
            let mut state = self.state.lock();
            match state.mode {
                EditState::Editable => {}
                EditState::Locked => return Err(CoreError::Locked.into()),
                EditState::Applying => return Err(CoreError::ApplyInProgress.into()),
                EditState::Deleted => return Err(CoreError::Deleted.into()),
            }
            if state.changes.is_empty() {
                state.mode = EditState::Locked;
                drop(state);
                self.released.notify_waiters();
                tracing::trace!(entity_id = %self.id, "Empty edit session closed");
                return Ok(());
            }
            state.mode = EditState::Applying;
            state.changes.clone()
        };

        tracing::debug!(entity_id = %self.id, fields = changes.len(), "Applying changes");
        // Rolls back if this future is dropped before the send settles
        let mut pending = PendingApply {
            entity: self,
            armed: true,
        };
        match sender.send(self.id, &changes, reason).await {
            Ok(()) => {
                pending.armed = false;
                {
                    let mut state = self.state.lock();
                    state.changes.clear();
                    if state.mode == EditState::Applying {
                        state.mode = EditState::Locked;
                    }
                }
                self.released.notify_waiters();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(entity_id = %self.id, error = %e, "Apply failed; rolling back");
                pending.armed = false;
                self.rollback();
                Err(e)
            }
        }
    }

    /// Restore every original and close the session: Editable -> Locked
    ///
    /// Closing when no session is open is a no-op.
    pub fn undo_changes(&self) -> Result<(), CoreError> {
        match self.state() {
            EditState::Applying => Err(CoreError::ApplyInProgress),
            EditState::Deleted => Err(CoreError::Deleted),
            EditState::Locked | EditState::Editable => {
                self.rollback();
                Ok(())
            }
        }
    }

    fn rollback(&self) {
        {
            let mut state = self.state.lock();
            let State {
                entity,
                changes,
                mode,
                ..
            } = &mut *state;
            for change in changes.take().into_iter().rev() {
                entity.set(change.old);
            }
            if mode.is_held() {
                *mode = EditState::Locked;
            }
        }
        tracing::trace!(entity_id = %self.id, "Edit session rolled back");
        self.released.notify_waiters();
    }
}

/// Settles an apply whose future was dropped mid-send
struct PendingApply<'a, E: Mutable> {
    entity: &'a TrackedEntity<E>,
    armed: bool,
}

impl<E: Mutable> Drop for PendingApply<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(entity_id = %self.entity.id, "Apply abandoned; rolling back");
            self.entity.rollback();
        }
    }
}

impl<E: Mutable + NetworkSynced> TrackedEntity<E> {
    /// Fold in a push update unless a local edit holds the entity
    pub fn observe_remote(&self, incoming: E) -> RemoteOutcome {
        let mut state = self.state.lock();
        match state.mode {
            EditState::Locked => {
                state.entity.merge_remote(incoming);
                RemoteOutcome::Applied
            }
            EditState::Editable | EditState::Applying => {
                state.discarded += 1;
                tracing::debug!(entity_id = %self.id, "Push update discarded during edit session");
                RemoteOutcome::Discarded
            }
            EditState::Deleted => RemoteOutcome::Deleted,
        }
    }
}

impl<E: Mutable + Deletable> TrackedEntity<E> {
    /// Apply the deletion signal; returns `false` if already deleted
    ///
    /// An open edit session is dropped without restoring its originals.
    pub fn mark_deleted(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.mode == EditState::Deleted {
                return false;
            }
            state.mode = EditState::Deleted;
            state.changes.clear();
            state.entity.on_deleted();
        }
        tracing::debug!(entity_id = %self.id, "Entity deleted");
        self.released.notify_waiters();
        true
    }
}

impl<E: Mutable + Clone> TrackedEntity<E> {
    /// Copy of the current entity
    pub fn cloned(&self) -> E {
        self.state.lock().entity.clone()
    }
}

impl<E: Mutable> fmt::Debug for TrackedEntity<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TrackedEntity")
            .field("id", &self.id)
            .field("state", &state.mode)
            .field("pending", &state.changes.len())
            .finish()
    }
}
