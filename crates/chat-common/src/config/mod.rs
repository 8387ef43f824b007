//! Configuration structs

mod client_config;

pub use client_config::{
    AppSettings, ClientConfig, Compression, ConfigError, DispatchConfig, Environment,
    GatewayConfig, RestConfig,
};
