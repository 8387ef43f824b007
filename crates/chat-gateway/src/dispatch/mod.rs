//! Dispatch delivery
//!
//! Decoded dispatch events, the intent table, the router and the queue that
//! feeds it.

mod event;
mod event_types;
mod queue;
mod router;

pub use event::DispatchEvent;
pub use event_types::GatewayEventType;
pub use queue::{DispatchPolicy, DispatchQueue};
pub use router::{handler_fn, EventHandler, EventRouter, FnHandler, RouterError};
