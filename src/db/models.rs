use serde::{Deserialize, Serialize};

use crate::discord::{DiscordAttachment, DiscordEmbed};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    pub channel_id: String,
    pub message_id: String,
    pub user_id: String,
    pub username: String,
    pub nickname: Option<String>,
    pub content: String,
    pub timestamp: String,
    pub embeds: Vec<DiscordEmbed>,
    pub attachments: Vec<DiscordAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRow {
    pub guild_id: String,
    pub user_id: String,
    pub username: String,
    pub nickname: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: String,
    pub username: String,
    pub avatar: Option<String>,
    pub discriminator: String,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRow {
    pub channel_id: String,
    pub message_id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarFileRow {
    pub user_id: String,
    pub path: String,
}
