//! # chat-client
//!
//! The client handle: a rate-limited REST client, a gateway session and the
//! dispatch queue that feeds registered handlers, built from one
//! [`ClientConfig`](chat_common::ClientConfig).
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> Result<(), chat_client::ClientError> {
//! use chat_client::Client;
//! use chat_common::ClientConfig;
//! use chat_gateway::{handler_fn, DispatchEvent, GatewayEventType};
//!
//! let client = Client::builder(ClientConfig::new("token"))
//!     .on(
//!         GatewayEventType::MessageCreate,
//!         handler_fn(|event: DispatchEvent| async move {
//!             println!("message #{:?}", event.sequence);
//!         }),
//!     )?
//!     .build()
//!     .await?;
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{Client, ClientBuilder};
pub use error::{ClientError, ClientResult};
