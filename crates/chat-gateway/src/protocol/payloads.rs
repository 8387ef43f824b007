//! Payload definitions
//!
//! Handshake payloads plus the client-originated commands (ops 3, 4 and 8).

use chat_core::{Intents, Snowflake};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Create a Hello payload with the given interval
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

/// Payload for op 2 (Identify)
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Bot token
    pub token: String,

    /// Gateway intents
    pub intents: Intents,

    /// Payload compression (each binary frame is a zlib message)
    #[serde(default)]
    pub compress: bool,

    /// Client connection properties
    pub properties: IdentifyProperties,

    /// Initial presence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceUpdatePayload>,
}

impl fmt::Debug for IdentifyPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifyPayload")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("compress", &self.compress)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Client connection properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentifyProperties {
    /// Operating system
    pub os: String,

    /// Library name
    pub browser: String,

    /// Library name, again
    pub device: String,
}

impl IdentifyProperties {
    /// Properties describing this library on the current platform
    #[must_use]
    pub fn library(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            os: std::env::consts::OS.to_string(),
            browser: name.clone(),
            device: name,
        }
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::library(env!("CARGO_PKG_NAME"))
    }
}

/// Payload for op 6 (Resume)
#[derive(Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Bot token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: Option<u64>,
}

impl fmt::Debug for ResumePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumePayload")
            .field("token", &"<redacted>")
            .field("session_id", &self.session_id)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Payload of the READY dispatch (fields the session needs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    /// Gateway version
    #[serde(default)]
    pub v: Option<u8>,

    /// Session ID used for Resume
    pub session_id: String,

    /// URL to use when resuming this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_gateway_url: Option<String>,
}

/// Payload for op 3 (Presence Update)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceUpdatePayload {
    /// Unix time in milliseconds the client went idle
    pub since: Option<u64>,

    /// Activities, passed through as-is
    #[serde(default)]
    pub activities: Vec<serde_json::Value>,

    /// New status (online, idle, dnd, invisible, offline)
    pub status: String,

    /// Whether the client is AFK
    #[serde(default)]
    pub afk: bool,
}

impl PresenceUpdatePayload {
    /// Valid status values
    pub const VALID_STATUSES: &'static [&'static str] = &["online", "idle", "dnd", "invisible", "offline"];

    /// A presence with just a status
    #[must_use]
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            since: None,
            activities: Vec::new(),
            status: status.into(),
            afk: false,
        }
    }

    /// Check if the status is valid
    #[must_use]
    pub fn is_valid_status(&self) -> bool {
        Self::VALID_STATUSES.contains(&self.status.as_str())
    }
}

/// Payload for op 4 (Voice State Update)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceStateUpdatePayload {
    pub guild_id: Snowflake,

    /// Channel to join, or `None` to disconnect
    pub channel_id: Option<Snowflake>,

    pub self_mute: bool,

    pub self_deaf: bool,
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestGuildMembersPayload {
    pub guild_id: Snowflake,

    /// Username prefix; empty string with limit 0 requests everyone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    pub limit: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presences: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<Snowflake>>,

    /// Echoed back in the GUILD_MEMBERS_CHUNK events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl RequestGuildMembersPayload {
    /// Request every member of a guild
    #[must_use]
    pub fn all(guild_id: Snowflake) -> Self {
        Self {
            guild_id,
            query: Some(String::new()),
            limit: 0,
            presences: None,
            user_ids: None,
            nonce: None,
        }
    }

    /// Check the query/user_ids exclusivity the server enforces
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.query.is_some() != self.user_ids.is_some()
    }
}
