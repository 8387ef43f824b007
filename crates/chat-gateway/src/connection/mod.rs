//! Connection-level state
//!
//! Per-connection session data, the connection state machine's states and
//! the budgeted outbound writer.

mod session;
mod state;
pub(crate) mod writer;

pub use session::{Session, MAX_HEARTBEAT_INTERVAL};
pub use state::{ConnectionState, SessionNotice};
pub use writer::SendBudget;
