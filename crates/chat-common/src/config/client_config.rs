//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use chat_core::Intents;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub app: AppSettings,
    /// Bot token, sent as `Bot <token>` over REST and in Identify/Resume
    pub token: String,
    pub gateway: GatewayConfig,
    pub rest: RestConfig,
    pub dispatch: DispatchConfig,
}

/// General application settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: Environment::default(),
        }
    }
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Gateway frame compression mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Compression {
    /// Plain text frames
    #[default]
    None,
    /// Each binary frame is a complete zlib message (Identify `compress: true`)
    Payload,
    /// One inflate context per connection (`compress=zlib-stream` query)
    ZlibStream,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "payload" => Ok(Self::Payload),
            "zlib-stream" => Ok(Self::ZlibStream),
            other => Err(format!("unknown compression mode '{other}'")),
        }
    }
}

/// Gateway session configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Fixed gateway URL; when unset the URL is bootstrapped over REST
    pub url: Option<String>,
    pub intents: Intents,
    pub compression: Compression,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub reconnect_delay: Duration,
    pub invalid_session_delay: Duration,
    /// Outbound payloads allowed per `send_window`
    pub send_limit: u32,
    pub send_window: Duration,
    /// Delay the first heartbeat by a random fraction of the interval
    pub heartbeat_jitter: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            intents: Intents::default(),
            compression: Compression::default(),
            connect_timeout: Duration::from_millis(default_connect_timeout_ms()),
            handshake_timeout: Duration::from_millis(default_handshake_timeout_ms()),
            reconnect_delay: Duration::from_millis(default_reconnect_delay_ms()),
            invalid_session_delay: Duration::from_millis(default_invalid_session_delay_ms()),
            send_limit: default_send_limit(),
            send_window: Duration::from_millis(default_window_ms()),
            heartbeat_jitter: true,
        }
    }
}

/// REST client configuration
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub api_base: String,
    pub global_limit: u32,
    pub global_window: Duration,
    /// Retries after a 429 before the failure is surfaced
    pub max_retries: u32,
    /// Consecutive 404s after which a route is marked missing
    pub missing_route_threshold: u32,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            global_limit: default_send_limit(),
            global_window: Duration::from_millis(default_window_ms()),
            max_retries: default_max_retries(),
            missing_route_threshold: default_missing_route_threshold(),
            timeout: Duration::from_millis(default_rest_timeout_ms()),
            user_agent: default_user_agent(),
        }
    }
}

/// Dispatch delivery configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Queue events while REST requests are in flight
    pub defer_while_rest: bool,
    pub drain_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            defer_while_rest: false,
            drain_interval: Duration::from_millis(default_drain_interval_ms()),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "chat-client".to_string()
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/chat-client, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_invalid_session_delay_ms() -> u64 {
    2_500
}

fn default_send_limit() -> u32 {
    120
}

fn default_window_ms() -> u64 {
    60_000 // 1 minute
}

fn default_max_retries() -> u32 {
    3
}

fn default_missing_route_threshold() -> u32 {
    2
}

fn default_rest_timeout_ms() -> u64 {
    15_000
}

fn default_drain_interval_ms() -> u64 {
    10
}

/// Read `name` through `lookup` and parse it, falling back to `default` when unset
fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name, e.to_string())),
        _ => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, name: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, name, default).map(Duration::from_millis)
}

impl ClientConfig {
    /// Build a configuration with defaults around a token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            app: AppSettings::default(),
            token: token.into(),
            gateway: GatewayConfig::default(),
            rest: RestConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `BOT_TOKEN` is missing or a variable fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_source(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingVar("BOT_TOKEN"))?;

        let intents = match lookup("GATEWAY_INTENTS") {
            Some(raw) if !raw.trim().is_empty() => Intents::parse(&raw)
                .map_err(|e| ConfigError::InvalidValue("GATEWAY_INTENTS", e.to_string()))?,
            _ => Intents::default(),
        };

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: parse_or(&lookup, "APP_ENV", Environment::default())?,
            },
            token: token.trim().to_string(),
            gateway: GatewayConfig {
                url: lookup("GATEWAY_URL").filter(|u| !u.trim().is_empty()),
                intents,
                compression: parse_or(&lookup, "GATEWAY_COMPRESSION", Compression::default())?,
                connect_timeout: millis_or(
                    &lookup,
                    "GATEWAY_CONNECT_TIMEOUT_MS",
                    default_connect_timeout_ms(),
                )?,
                handshake_timeout: millis_or(
                    &lookup,
                    "GATEWAY_HANDSHAKE_TIMEOUT_MS",
                    default_handshake_timeout_ms(),
                )?,
                reconnect_delay: millis_or(
                    &lookup,
                    "GATEWAY_RECONNECT_DELAY_MS",
                    default_reconnect_delay_ms(),
                )?,
                invalid_session_delay: millis_or(
                    &lookup,
                    "GATEWAY_INVALID_SESSION_DELAY_MS",
                    default_invalid_session_delay_ms(),
                )?,
                send_limit: parse_or(&lookup, "GATEWAY_SEND_LIMIT", default_send_limit())?,
                send_window: millis_or(&lookup, "GATEWAY_SEND_WINDOW_MS", default_window_ms())?,
                heartbeat_jitter: parse_or(&lookup, "GATEWAY_HEARTBEAT_JITTER", true)?,
            },
            rest: RestConfig {
                api_base: lookup("REST_API_BASE")
                    .map(|base| base.trim_end_matches('/').to_string())
                    .unwrap_or_else(default_api_base),
                global_limit: parse_or(&lookup, "REST_GLOBAL_LIMIT", default_send_limit())?,
                global_window: millis_or(&lookup, "REST_GLOBAL_WINDOW_MS", default_window_ms())?,
                max_retries: parse_or(&lookup, "REST_MAX_RETRIES", default_max_retries())?,
                missing_route_threshold: parse_or(
                    &lookup,
                    "REST_MISSING_ROUTE_THRESHOLD",
                    default_missing_route_threshold(),
                )?,
                timeout: millis_or(&lookup, "REST_TIMEOUT_MS", default_rest_timeout_ms())?,
                user_agent: lookup("REST_USER_AGENT").unwrap_or_else(default_user_agent),
            },
            dispatch: DispatchConfig {
                defer_while_rest: parse_or(&lookup, "DISPATCH_DEFER_WHILE_REST", false)?,
                drain_interval: millis_or(
                    &lookup,
                    "DISPATCH_DRAIN_INTERVAL_MS",
                    default_drain_interval_ms(),
                )?,
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
