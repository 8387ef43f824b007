//! # chat-cache
//!
//! Cached, server-authoritative entities with transactional local edits.
//!
//! ## Features
//!
//! - **Tracked entities**: `Locked`/`Editable` edit state machine with an absorbing `Deleted`
//! - **Change sets**: typed original/current pairs per touched field, restored on failure
//! - **Push path**: remote updates merge while Locked and are discarded mid-edit
//! - **Change senders**: the seam between an apply and the REST call that persists it
//!
//! ## Example
//!
//! ```ignore
//! use chat_cache::{EntityCache, RestChangeSender};
//!
//! let channels = EntityCache::<Channel>::new();
//! let (channel, _) = channels.observe(incoming);
//!
//! channel.begin_changes()?;
//! channel.set_property(ChannelValue::Name("lobby".into()))?;
//! channel.apply_changes(&sender, Some("rename")).await?;
//! ```

pub mod cache;
pub mod tracker;

pub use cache::EntityCache;
pub use tracker::{
    ApplyError, Change, ChangeSender, ChangeSet, EditState, RemoteOutcome, RestChangeSender,
    TrackedEntity,
};
