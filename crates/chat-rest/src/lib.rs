//! # chat-rest
//!
//! REST side of the client: route bucket keys, the three-layer rate limiter
//! and a reqwest client that honors it.

pub mod client;
pub mod error;
pub mod limiter;
pub mod route;

// Re-export commonly used types at crate root
pub use client::{RestClient, RestRequest, RestResponse, HEADER_AUDIT_LOG_REASON};
pub use error::RestError;
pub use limiter::{RateLimitInfo, RestRateLimiter};
pub use route::Route;
