//! Gateway intents bitflags
//!
//! Intents select which groups of dispatch events the gateway delivers to a session.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags! {
    /// Gateway intent flags sent in Identify
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        /// Guild, channel, role and thread lifecycle
        const GUILDS                        = 1 << 0;
        /// Member add/update/remove (privileged)
        const GUILD_MEMBERS                 = 1 << 1;
        /// Audit log entries and bans
        const GUILD_MODERATION              = 1 << 2;
        /// Emoji and sticker updates
        const GUILD_EMOJIS_AND_STICKERS     = 1 << 3;
        /// Integration updates
        const GUILD_INTEGRATIONS            = 1 << 4;
        /// Webhook updates
        const GUILD_WEBHOOKS                = 1 << 5;
        /// Invite create/delete
        const GUILD_INVITES                 = 1 << 6;
        /// Voice state updates
        const GUILD_VOICE_STATES            = 1 << 7;
        /// Presence updates (privileged)
        const GUILD_PRESENCES               = 1 << 8;
        /// Messages in guild channels
        const GUILD_MESSAGES                = 1 << 9;
        /// Reactions in guild channels
        const GUILD_MESSAGE_REACTIONS       = 1 << 10;
        /// Typing in guild channels
        const GUILD_MESSAGE_TYPING          = 1 << 11;
        /// Direct messages
        const DIRECT_MESSAGES               = 1 << 12;
        /// Reactions in direct messages
        const DIRECT_MESSAGE_REACTIONS      = 1 << 13;
        /// Typing in direct messages
        const DIRECT_MESSAGE_TYPING         = 1 << 14;
        /// Message content fields (privileged)
        const MESSAGE_CONTENT               = 1 << 15;
        /// Scheduled events
        const GUILD_SCHEDULED_EVENTS        = 1 << 16;
        /// Auto moderation configuration
        const AUTO_MODERATION_CONFIGURATION = 1 << 20;
        /// Auto moderation execution
        const AUTO_MODERATION_EXECUTION     = 1 << 21;

        /// Intents that require explicit approval
        const PRIVILEGED = Self::GUILD_MEMBERS.bits()
            | Self::GUILD_PRESENCES.bits()
            | Self::MESSAGE_CONTENT.bits();

        /// Default intents for a bot that reads guild messages
        const DEFAULT = Self::GUILDS.bits() | Self::GUILD_MESSAGES.bits();
    }
}

impl Intents {
    /// Check if any privileged intent is requested
    #[inline]
    pub fn is_privileged(&self) -> bool {
        self.intersects(Intents::PRIVILEGED)
    }

    /// Check whether this set enables at least one of `required`
    ///
    /// An empty requirement is always satisfied.
    #[inline]
    pub fn satisfies(&self, required: Intents) -> bool {
        required.is_empty() || self.intersects(required)
    }

    /// Parse from decimal bits, or from a `|`-separated list of flag names
    pub fn parse(s: &str) -> Result<Self, IntentsParseError> {
        let trimmed = s.trim();
        if let Ok(bits) = trimmed.parse::<u64>() {
            return Ok(Intents::from_bits_truncate(bits));
        }

        let mut intents = Intents::empty();
        for name in trimmed.split('|').map(str::trim).filter(|n| !n.is_empty()) {
            let flag = Intents::from_name(&name.to_ascii_uppercase())
                .ok_or_else(|| IntentsParseError::UnknownIntent(name.to_string()))?;
            intents |= flag;
        }
        Ok(intents)
    }

    /// Get a list of all named intents that are set
    pub fn list(&self) -> Vec<&'static str> {
        Intents::all()
            .iter_names()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| name)
            .filter(|name| *name != "PRIVILEGED" && *name != "DEFAULT")
            .collect()
    }
}

/// Error when parsing intents from configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentsParseError {
    #[error("unknown intent: {0}")]
    UnknownIntent(String),
}

impl Default for Intents {
    fn default() -> Self {
        Intents::DEFAULT
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

// Intents are plain integers on the wire
impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u64::deserialize(deserializer)?;
        Ok(Intents::from_bits_truncate(bits))
    }
}
