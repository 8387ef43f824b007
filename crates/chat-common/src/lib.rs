//! # chat-common
//!
//! Shared utilities including configuration, error handling, telemetry, and
//! supervisor signalling.

pub mod config;
pub mod error;
pub mod supervisor;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AppSettings, ClientConfig, Compression, ConfigError, DispatchConfig, Environment,
    GatewayConfig, RestConfig,
};
pub use error::{AppError, AppResult};
pub use supervisor::{Supervisor, SupervisorReceiver, SupervisorSignal};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
