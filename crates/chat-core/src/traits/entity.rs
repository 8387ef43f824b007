//! Entity capability traits
//!
//! A domain type opts into each behavior of the tracker separately:
//! local edits ([`Mutable`]), push updates ([`NetworkSynced`]) and deletion
//! ([`Deletable`]).

use std::fmt::Debug;
use std::hash::Hash;

use super::Snapshot;
use crate::value_objects::Snowflake;

/// A server-authoritative object with a stable identity
pub trait Entity: Send + Sync + 'static {
    fn id(&self) -> Snowflake;
}

/// The tagged field-value enum of an entity
///
/// Each variant carries one field's value; [`FieldValue::field`] names which.
pub trait FieldValue: Snapshot + Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Field discriminant
    type Field: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn field(&self) -> Self::Field;
}

/// Entities whose fields can be edited locally
pub trait Mutable: Entity {
    type Value: FieldValue;

    /// Current value of `field`
    fn get(&self, field: <Self::Value as FieldValue>::Field) -> Self::Value;

    /// Overwrite the field named by `value`
    fn set(&mut self, value: Self::Value);
}

/// Entities updated by push events
pub trait NetworkSynced: Entity + Sized {
    /// Fold an incoming server copy into `self`
    ///
    /// Replaces wholesale by default. Override for partial update payloads.
    fn merge_remote(&mut self, incoming: Self) {
        *self = incoming;
    }
}

/// Entities that react to a deletion signal
pub trait Deletable: Entity {
    /// Called once when the deletion signal is applied
    fn on_deleted(&mut self) {}
}
