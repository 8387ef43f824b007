//! # chat-gateway
//!
//! Gateway client: wire protocol, the session state machine with its
//! heartbeat and receive loops, and ordered dispatch delivery.
//!
//! ```no_run
//! # async fn run() -> Result<(), chat_gateway::GatewayError> {
//! use chat_common::{GatewayConfig, Supervisor};
//! use chat_gateway::GatewaySession;
//!
//! let (session, mut events) = GatewaySession::new(
//!     GatewayConfig::default(),
//!     "token",
//!     "wss://gateway.discord.gg",
//!     Supervisor::detached(),
//! );
//! session.connect().await?;
//! while let Some(event) = events.recv().await {
//!     println!("{} #{:?}", event.name, event.sequence);
//! }
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod protocol;

pub use connection::{ConnectionState, SessionNotice};
pub use dispatch::{
    handler_fn, DispatchEvent, DispatchPolicy, DispatchQueue, EventHandler, EventRouter,
    GatewayEventType, RouterError,
};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{DispatchReceiver, GatewaySession};
