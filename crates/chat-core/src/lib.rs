//! # chat-core
//!
//! Leaf primitives shared by every other crate: identifiers, gateway intents,
//! rate budgets, the in-flight request counter and the entity capability traits.
//! This crate performs no I/O.

pub mod error;
pub mod in_flight;
pub mod ratelimit;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use error::CoreError;
pub use in_flight::{InFlight, InFlightGuard};
pub use ratelimit::{BucketBudget, WindowBudget};
pub use traits::{Deletable, Entity, FieldValue, Mutable, NetworkSynced, Snapshot};
pub use value_objects::{Intents, IntentsParseError, Snowflake, SnowflakeParseError};
