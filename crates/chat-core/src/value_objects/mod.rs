//! Value objects - immutable types shared by every layer

mod intents;
mod snowflake;

pub use intents::{Intents, IntentsParseError};
pub use snowflake::{Snowflake, SnowflakeParseError};
