use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod embed;
pub mod session;

pub use self::embed::DiscordEmbed;
pub use self::session::DiscordSession;

/// Current layout of persisted guild and channel snapshots.
pub const SNAPSHOT_VERSION: u32 = 1;

pub const MAX_MESSAGES_PER_PAGE: usize = 100;
pub const MAX_MEMBERS_PER_PAGE: usize = 1000;

const GUILD_TEXT_CHANNEL: u8 = 0;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid {kind} id: {value}")]
    InvalidId { kind: &'static str, value: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("channel {0} does not belong to a guild")]
    NotGuildChannel(String),
    #[error("discord request failed: {0}")]
    Http(String),
}

/// Point-in-time copy of a guild's metadata as stored in `guilds.guild_json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSnapshot {
    pub version: u32,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl GuildSnapshot {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: id.into(),
            name: name.into(),
            icon_url: None,
            owner_id: None,
            description: None,
            captured_at: Utc::now(),
        }
    }
}

/// Point-in-time copy of a channel's metadata as stored in `channels.channel_json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub version: u32,
    pub id: String,
    pub guild_id: String,
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    pub kind: u8,
    #[serde(default)]
    pub position: u16,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl ChannelSnapshot {
    pub fn new(
        id: impl Into<String>,
        guild_id: impl Into<String>,
        name: impl Into<String>,
        kind: u8,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: id.into(),
            guild_id: guild_id.into(),
            name: name.into(),
            topic: None,
            kind,
            position: 0,
            nsfw: false,
            parent_id: None,
            captured_at: Utc::now(),
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == GUILD_TEXT_CHANNEL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    pub discriminator: String,
    pub avatar_url: Option<String>,
    // Only reported by the API for the authenticated user.
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordAttachment {
    pub id: String,
    pub filename: String,
    pub url: String,
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    pub content: String,
    pub timestamp: String,
    pub attachments: Vec<DiscordAttachment>,
    pub embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordMember {
    pub guild_id: String,
    pub user: DiscordUser,
    pub nick: Option<String>,
    pub roles: Vec<String>,
}

/// Read access to the remote chat service.
///
/// Message history is paged newest first with a `before` cursor; member lists
/// are paged in ascending user id order with an `after` cursor.
#[async_trait]
pub trait Session: Send + Sync {
    async fn channel(&self, channel_id: &str) -> Result<ChannelSnapshot, SessionError>;

    async fn guild(&self, guild_id: &str) -> Result<GuildSnapshot, SessionError>;

    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<ChannelSnapshot>, SessionError>;

    async fn channel_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<DiscordMessage>, SessionError>;

    async fn guild_members(
        &self,
        guild_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DiscordMember>, SessionError>;

    /// Member already known to the session without a remote call.
    fn cached_member(&self, guild_id: &str, user_id: &str) -> Option<DiscordMember>;

    async fn guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<DiscordMember, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::{ChannelSnapshot, GuildSnapshot, SNAPSHOT_VERSION};

    #[test]
    fn guild_snapshot_reads_stored_v1_layout() {
        let stored = r#"{
            "version": 1,
            "id": "81384788765712384",
            "name": "Discord API",
            "icon_url": null,
            "owner_id": "53905483156684800",
            "captured_at": "2024-03-01T12:00:00Z"
        }"#;

        let guild: GuildSnapshot = serde_json::from_str(stored).expect("parse snapshot");

        assert_eq!(guild.version, SNAPSHOT_VERSION);
        assert_eq!(guild.name, "Discord API");
        assert_eq!(guild.owner_id.as_deref(), Some("53905483156684800"));
        assert!(guild.description.is_none());
    }

    #[test]
    fn channel_snapshot_survives_json_column() {
        let mut channel = ChannelSnapshot::new("100", "10", "general", 0);
        channel.topic = Some("talk here".to_string());

        let json = serde_json::to_string(&channel).expect("serialize");
        let parsed: ChannelSnapshot = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed, channel);
        assert!(parsed.is_text());
    }

    #[test]
    fn voice_channel_is_not_text() {
        let channel = ChannelSnapshot::new("100", "10", "lounge", 2);
        assert!(!channel.is_text());
    }
}
