//! Gateway session
//!
//! The connection state machine, its handshake and the per-connection
//! heartbeat and receive loops.

mod context;
mod handshake;
mod heartbeat;
mod receiver;
mod session;

pub use handshake::{gateway_url, GATEWAY_VERSION};
pub use session::{DispatchReceiver, GatewaySession};
