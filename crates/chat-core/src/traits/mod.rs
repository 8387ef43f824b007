//! Capability traits implemented by cached domain types

mod entity;
mod snapshot;

pub use entity::{Deletable, Entity, FieldValue, Mutable, NetworkSynced};
pub use snapshot::Snapshot;
