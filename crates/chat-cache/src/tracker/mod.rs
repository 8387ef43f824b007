//! Entity mutation tracker
//!
//! Transactional local edits with rollback on cached, server-authoritative
//! entities, kept mutually exclusive with inbound push updates.

mod change_set;
mod sender;
mod tracked;

#[cfg(test)]
pub(crate) mod test_support;

pub use change_set::{Change, ChangeSet};
pub use sender::{ApplyError, ChangeSender, RestChangeSender};
pub use tracked::{EditState, RemoteOutcome, TrackedEntity};
